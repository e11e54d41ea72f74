//! Visibility scenarios: exported and unexported names, true-private
//! methods and the unknown handler.

use crate::test_harness::ScriptSession;
use crate::RuntimeError;
use pretty_assertions::assert_eq;

fn keeper() -> ScriptSession {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Keeper
            oo::define Keeper {
                method Hidden {} {return h}
                method show {} {return [my Hidden]}
            }
            Keeper create k
            "#,
        )
        .unwrap();
    session
}

#[test]
fn test_unexported_methods_are_reachable_through_my() {
    let mut session = keeper();
    session.assert_evaluates_to("k show", "h").unwrap();

    let error = session.eval_error("k Hidden").unwrap();
    assert_eq!(
        error.to_string(),
        "unknown method \"Hidden\": must be destroy or show"
    );
    assert_eq!(error.error_code(), vec!["TCL", "LOOKUP", "METHOD", "Hidden"]);
}

#[test]
fn test_export_and_unexport_change_reachability() {
    let mut session = keeper();
    session.eval("oo::define Keeper export Hidden").unwrap();
    session.assert_evaluates_to("k Hidden", "h").unwrap();

    session.eval("oo::define Keeper unexport show").unwrap();
    let error = session.eval_error("k show").unwrap();
    assert!(matches!(error, RuntimeError::MethodNotFound { .. }));
    assert_eq!(
        error.to_string(),
        "unknown method \"show\": must be Hidden or destroy"
    );
}

#[test]
fn test_most_specific_definition_decides_visibility() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Base
            oo::define Base method greet {} {return hello}
            oo::class create Quiet
            oo::define Quiet {
                superclass Base
                method greet {} {return [next]}
                unexport greet
            }
            Base create b
            Quiet create q
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("b greet", "hello").unwrap();
    let error = session.eval_error("q greet").unwrap();
    assert!(matches!(error, RuntimeError::MethodNotFound { .. }));
}

#[test]
fn test_private_methods_need_the_declaring_scope() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Counter
            oo::define Counter {
                private method secret {} {return 42}
                method reveal {} {return [my secret]}
            }
            oo::class create Sub
            oo::define Sub {
                superclass Counter
                method peek {} {return [my secret]}
            }
            Counter create c
            Sub create s
            "#,
        )
        .unwrap();

    session.assert_evaluates_to("c reveal", "42").unwrap();
    session.assert_evaluates_to("s reveal", "42").unwrap();

    let error = session.eval_error("c secret").unwrap();
    assert_eq!(
        error.to_string(),
        "unknown method \"secret\": must be destroy or reveal"
    );
    let error = session.eval_error("s peek").unwrap();
    assert!(matches!(error, RuntimeError::MethodNotFound { .. }));

    // The chain that includes the private method is not reused for outsiders
    session.assert_evaluates_to("c reveal", "42").unwrap();
    assert!(session.eval_error("c secret").is_ok());
}

#[test]
fn test_object_private_methods() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Safe
            Safe create vault
            oo::objdefine vault {
                private method pin {} {return 1234}
                method check {} {return [my pin]}
            }
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("vault check", "1234").unwrap();
    assert!(session.eval_error("vault pin").is_ok());
}

#[test]
fn test_custom_unknown_handler() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Lenient
            oo::define Lenient method unknown {name args} {return "no $name ([llength $args])"}
            Lenient create l
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("l missing 1 2", "no missing (2)").unwrap();
}

#[test]
fn test_default_unknown_requires_a_method_name() {
    let mut session = keeper();
    let error = session.eval_error("k unknown").unwrap();
    assert!(matches!(error, RuntimeError::MethodNotFound { .. }));

    let error = session.eval_error("k").unwrap();
    assert!(matches!(error, RuntimeError::WrongArgs { .. }));
}
