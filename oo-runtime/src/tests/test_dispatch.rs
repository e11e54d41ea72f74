//! Dispatch scenarios: resolution order, `next`, `nextto`, forwarding and
//! introspection from inside running methods.

use crate::builder::stereotype_chain;
use crate::test_harness::ScriptSession;
use crate::{CallKind, Declarer, RuntimeConfig, RuntimeError, Value};
use pretty_assertions::assert_eq;

fn animals() -> ScriptSession {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Animal
            oo::define Animal {
                method speak {} {return "..."}
                method describe {{adjective plain}} {return "$adjective animal"}
                method only {} {next}
            }
            oo::class create Dog
            oo::define Dog {
                superclass Animal
                method speak {} {return "Woof[next]"}
                method describe {adjective} {return "dog, [next $adjective]"}
            }
            Dog create d
            "#,
        )
        .unwrap();
    session
}

#[test]
fn test_next_reaches_superclass_implementation() {
    let mut session = animals();
    session.assert_evaluates_to("d speak", "Woof...").unwrap();
}

#[test]
fn test_next_passes_arguments() {
    let mut session = animals();
    session
        .assert_evaluates_to("d describe happy", "dog, happy animal")
        .unwrap();
    session
        .assert_evaluates_to("Animal create a; a describe", "plain animal")
        .unwrap();
}

#[test]
fn test_next_past_the_end_fails() {
    let mut session = animals();
    let error = session.eval_error("d only").unwrap();
    assert!(matches!(error, RuntimeError::NoNextMethod { .. }));
    assert_eq!(error.to_string(), "no next method implementation");
    assert_eq!(error.error_code(), vec!["TCL", "OO", "NOTHING_NEXT"]);
}

#[test]
fn test_superclass_order_decides_precedence() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create A
            oo::define A method greet {} {return A}
            oo::class create B
            oo::define B method greet {} {return B}
            oo::class create C
            oo::define C superclass A B
            C create c
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("c greet", "A").unwrap();

    session.eval("oo::define C superclass B A").unwrap();
    session.assert_evaluates_to("c greet", "B").unwrap();
}

#[test]
fn test_object_methods_precede_mixins_and_class() {
    let mut session = animals();
    session
        .eval(
            r#"
            oo::class create Loud
            oo::define Loud method speak {} {return "LOUD [next]"}
            oo::objdefine d mixin Loud
            oo::objdefine d method speak {} {return "own [next]"}
            "#,
        )
        .unwrap();
    session
        .assert_evaluates_to("d speak", "own LOUD Woof...")
        .unwrap();
}

#[test]
fn test_nextto_skips_intermediate_classes() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Base
            oo::define Base method who {} {return base}
            oo::class create Mid
            oo::define Mid {
                superclass Base
                method who {} {return "mid>[next]"}
            }
            oo::class create Top
            oo::define Top {
                superclass Mid
                method who {} {return "top>[nextto Base]"}
                method back {} {return [nextto Top]}
            }
            Top create t
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("t who", "top>base").unwrap();

    let error = session.eval_error("t back").unwrap();
    assert!(matches!(error, RuntimeError::NotInChain { .. }));
    assert!(error.to_string().contains("not reachable from here"));

    let error = session
        .eval_error("Base create b; oo::objdefine b method far {} {nextto Top}; b far")
        .unwrap();
    assert!(error.to_string().contains("has no non-filter implementation"));
}

#[test]
fn test_forward_methods() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Greeter
            oo::define Greeter {
                method hello {who} {return "hello $who"}
                forward hi my hello
                forward shout string toupper
            }
            Greeter create g
            "#,
        )
        .unwrap();
    session.assert_evaluates_to("g hi world", "hello world").unwrap();
    session.assert_evaluates_to("g shout hey", "HEY").unwrap();
}

#[test]
fn test_self_introspection() {
    let mut session = animals();
    session
        .eval(r#"oo::define Dog method introspect {} {return [list [self] [self method] [self class] [self next]]}"#)
        .unwrap();
    session
        .assert_evaluates_to("d introspect", "::d introspect ::Dog {}")
        .unwrap();

    session
        .eval(r#"oo::define Dog method speak {} {return [self next]}"#)
        .unwrap();
    session
        .assert_evaluates_to("d speak", "::Animal speak")
        .unwrap();
}

#[test]
fn test_call_depth_is_limited() {
    let mut session = ScriptSession::with_config(RuntimeConfig::default().with_max_call_depth(20));
    session
        .eval("oo::class create Loop; oo::define Loop method spin {} {my spin}; Loop create l")
        .unwrap();

    let error = session.eval_error("l spin").unwrap();
    assert!(matches!(error, RuntimeError::CallDepthExceeded { max_depth: 20 }));
    assert_eq!(session.foundation().call_depth(), 0);
}

#[test]
fn test_method_may_destroy_its_receiver() {
    let mut session = ScriptSession::new();
    session
        .eval(
            r#"
            oo::class create Temp
            oo::define Temp {
                method vanish {} {[self] destroy; return gone}
                destructor {lappend ::log destroyed}
            }
            Temp create t
            "#,
        )
        .unwrap();
    let t = session.object("t").unwrap();

    session.assert_evaluates_to("t vanish", "gone").unwrap();
    assert!(session.object("t").is_err());
    assert!(session.foundation().get(t).is_none());
    assert_eq!(session.global("log").unwrap(), Value::from("destroyed"));
}

#[test]
fn test_stereotype_chain_lists_implementations() {
    let session = animals();
    let dog = session.object("Dog").unwrap();
    let animal = session.object("Animal").unwrap();

    let chain = stereotype_chain(session.foundation(), dog, "speak", CallKind::Public).unwrap();
    let declarers: Vec<Declarer> = chain
        .entries()
        .iter()
        .map(|entry| entry.method.declarer())
        .collect();
    assert_eq!(declarers, vec![Declarer::Class(dog), Declarer::Class(animal)]);
}

#[test]
fn test_callchain_renders_running_chain() {
    let mut session = animals();
    session
        .eval(r#"oo::define Animal method speak {} {return [callchain]}"#)
        .unwrap();
    session
        .assert_evaluates_to(
            "d speak",
            "Woof{method speak ::Dog method} {method speak ::Animal method}",
        )
        .unwrap();
}
