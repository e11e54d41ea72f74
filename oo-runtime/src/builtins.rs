//! Native methods installed on the bootstrap classes.

use crate::builder;
use crate::call_context::CallContext;
use crate::define::install_method;
use crate::dispatch::Evaluator;
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::lifecycle;
use crate::method::{Declarer, MethodKind, Visibility};
use crate::value::Value;

/// Install `destroy`, `unknown` and `<cloned>` on the root object class and
/// `create` and `new` on the class of classes
pub(crate) fn install(foundation: &mut Foundation) {
    let object_class = Declarer::Class(foundation.object_class());
    let class_class = Declarer::Class(foundation.class_class());
    let unknown = foundation.unknown_name().to_string();
    let cloned = foundation.cloned_name().to_string();

    install_method(
        foundation,
        object_class,
        "destroy",
        MethodKind::native(object_destroy),
        Visibility::Public,
    );
    install_method(
        foundation,
        object_class,
        &unknown,
        MethodKind::native(object_unknown),
        Visibility::Unexported,
    );
    install_method(
        foundation,
        object_class,
        &cloned,
        MethodKind::native(|_, _, _| Ok(Value::Empty)),
        Visibility::Unexported,
    );
    install_method(
        foundation,
        class_class,
        "create",
        MethodKind::native(class_create),
        Visibility::Public,
    );
    install_method(
        foundation,
        class_class,
        "new",
        MethodKind::native(class_new),
        Visibility::Public,
    );
}

fn object_destroy(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
) -> Result<Value> {
    if !context.args().is_empty() {
        return Err(RuntimeError::wrong_args(context.usage_prefix()));
    }
    lifecycle::destroy_object(foundation, evaluator, context.receiver())?;
    Ok(Value::Empty)
}

fn object_unknown(
    foundation: &mut Foundation,
    _evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
) -> Result<Value> {
    let Some(method) = context.args().first() else {
        return Err(RuntimeError::wrong_args(format!(
            "{} method ?arg ...?",
            context.usage_prefix()
        )));
    };
    let receiver = context.receiver();
    let object_name = foundation.display_name(receiver);
    let names = builder::method_names(foundation, receiver, context.chain().kind())?;
    Err(RuntimeError::method_not_found(
        &object_name,
        &method.to_string(),
        &names,
    ))
}

fn class_create(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
) -> Result<Value> {
    let Some((name, args)) = context.args().split_first() else {
        return Err(RuntimeError::wrong_args(format!(
            "{} objectName ?arg ...?",
            context.usage_prefix()
        )));
    };
    let name = name.to_string();
    let args = args.to_vec();
    let id = lifecycle::create_object(foundation, evaluator, context.receiver(), Some(&name), &args)?;
    Ok(Value::string(foundation.display_name(id)))
}

fn class_new(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
) -> Result<Value> {
    let args = context.args().to_vec();
    let id = lifecycle::new_object(foundation, evaluator, context.receiver(), &args)?;
    Ok(Value::string(foundation.display_name(id)))
}
