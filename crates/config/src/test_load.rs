use std::{env, fs, path::Path, process};

use chorebot_state::StateDecl;
use gamekey::GameKey;

use crate::{Error, OpKind, PressWay, SwitchDirection, load_from_path, load_from_str};

const COMBAT: &str = r#"
name: combat
tick_ms: 20
states:
  - name: dodge-flash-yellow
    mutex_group: flash
  - name: dodge-flash-red
    mutex_group: flash
handler_templates:
  dodge:
    states: "[dodge-flash-yellow, 0, 1]"
    operations:
      - op: press
        key: dodge
operation_templates:
  combo:
    - op: press
      key: normal_attack
      repeat: 3
scenes:
  - label: flash
    triggers: [dodge-flash-yellow]
    interval: 0.5
    priority: 10
    handlers:
      - template: dodge
  - label: normal
    interval: 0.1
    handlers:
      - states: "![dodge-flash-yellow, 0, 1]"
        sub_handlers:
          - states: "[energy]{50,}"
            operations:
              - op: press
                key: special_attack
        operations:
          - template: combo
"#;

/// Unwrap a validation error into `(at, message)`.
fn invalid(src: &str) -> (String, String) {
    match load_from_str(src) {
        Err(Error::Validation { at, message, .. }) => (at, message),
        other => panic!("expected validation error, got {:?}", other),
    }
}

/// Wrap one handler body in a minimal profile.
fn with_handler(handler: &str) -> String {
    let mut src = String::from("scenes:\n  - label: s\n    handlers:\n      - ");
    let mut first = true;
    for line in handler.lines() {
        if !first {
            src.push_str("        ");
        }
        src.push_str(line);
        src.push('\n');
        first = false;
    }
    src
}

#[test]
fn loads_combat_profile() {
    let p = load_from_str(COMBAT).expect("load");
    assert_eq!(p.name, "combat");
    assert_eq!(p.tick_ms, 20);
    assert_eq!(
        p.states,
        vec![
            StateDecl::grouped("dodge-flash-yellow", "flash"),
            StateDecl::grouped("dodge-flash-red", "flash"),
            StateDecl::plain("energy"),
        ]
    );

    let flash = &p.scenes[0];
    assert_eq!(flash.label, "flash");
    assert_eq!(flash.priority, Some(10));
    assert_eq!(flash.triggers, vec!["dodge-flash-yellow".to_string()]);
    assert_eq!(flash.interval, 0.5);
    let dodge = &flash.handlers[0];
    assert_eq!(dodge.label, "scenes[0].handlers[0]");
    assert_eq!(dodge.condition.text(), "[dodge-flash-yellow, 0, 1]");
    assert_eq!(
        dodge.operations[0].kind,
        OpKind::Press {
            key: GameKey::Dodge,
            way: PressWay::Tap,
            press_time: 0.02,
            repeat: 1,
            interval: 0.0,
        }
    );

    let normal = &p.scenes[1];
    assert_eq!(normal.label, "normal");
    assert_eq!(normal.priority, None);
    let root = &normal.handlers[0];
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].operations[0].name(), "press special_attack");
    assert_eq!(root.operations.len(), 1);
    assert_eq!(root.operations[0].name(), "press normal_attack x3");
}

#[test]
fn handler_template_fields_are_overridable() {
    let src = r#"
handler_templates:
  base:
    label: base
    states: "[a]"
    operations:
      - op: wait
        seconds: 1
scenes:
  - handlers:
      - template: base
        states: "[b, 2]"
"#;
    let p = load_from_str(src).expect("load");
    assert_eq!(p.name, "profile");
    let h = &p.scenes[0].handlers[0];
    assert_eq!(h.label, "base");
    assert_eq!(h.condition.text(), "[b, 2]");
    assert_eq!(h.operations[0].kind, OpKind::Wait { seconds: 1.0 });
    assert_eq!(p.scenes[0].label, "scenes[0]");
    // only referenced states are implied
    assert_eq!(p.states, vec![StateDecl::plain("b")]);
}

#[test]
fn nested_operation_templates_splice_in_order() {
    let src = r#"
operation_templates:
  inner:
    - op: press
      key: e
  outer:
    - op: wait
      seconds: 0.1
    - template: inner
    - op: switch
      target: next
scenes:
  - handlers:
      - operations:
          - template: outer
          - op: clear_state
            state_list: [a, b]
"#;
    let p = load_from_str(src).expect("load");
    let names: Vec<String> = p.scenes[0].handlers[0]
        .operations
        .iter()
        .map(|o| o.name())
        .collect();
    assert_eq!(
        names,
        vec![
            "wait 0.1s",
            "press special_attack",
            "switch next",
            "clear_state a,b"
        ]
    );
    assert_eq!(
        p.scenes[0].handlers[0].operations[2].kind,
        OpKind::Switch {
            direction: SwitchDirection::Next
        }
    );
}

#[test]
fn handler_template_cycle() {
    let src = r#"
handler_templates:
  a:
    template: b
  b:
    template: a
scenes:
  - handlers:
      - template: a
"#;
    let (at, message) = invalid(src);
    assert_eq!(at, "handler_templates.b.template");
    assert!(message.contains("cycle: a -> b -> a"), "{}", message);

    // a template nested in its own sub_handlers
    let src = r#"
handler_templates:
  a:
    states: "[x]"
    sub_handlers:
      - template: a
scenes:
  - handlers:
      - template: a
"#;
    let (at, message) = invalid(src);
    assert_eq!(at, "scenes[0].handlers[0].sub_handlers[0].template");
    assert!(message.contains("cycle: a -> a"), "{}", message);

    // the same template in sibling subtrees is not a cycle
    let src = r#"
handler_templates:
  leaf:
    states: "[x]"
    operations:
      - op: press
        key: dodge
  pair:
    states: "[y]"
    sub_handlers:
      - template: leaf
      - template: leaf
scenes:
  - handlers:
      - template: pair
      - template: leaf
"#;
    let p = load_from_str(src).expect("load");
    assert_eq!(p.scenes[0].handlers[0].children.len(), 2);
}

#[test]
fn operation_template_cycle() {
    let src = r#"
operation_templates:
  x:
    - template: y
  y:
    - template: x
scenes:
  - handlers:
      - operations:
          - template: x
"#;
    let (at, message) = invalid(src);
    assert_eq!(at, "operation_templates.y[0].template");
    assert!(message.contains("x -> y -> x"), "{}", message);
}

#[test]
fn unknown_templates() {
    let (at, message) = invalid(&with_handler("template: nope"));
    assert_eq!(at, "scenes[0].handlers[0].template");
    assert!(message.contains("unknown handler template `nope`"));

    let (at, _) = invalid(&with_handler("operations:\n  - template: nope"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].template");
}

#[test]
fn unknown_key() {
    let (at, message) = invalid(&with_handler("operations:\n  - op: press\n    key: jump"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].key");
    assert_eq!(message, "unknown key `jump`");
}

#[test]
fn malformed_expression() {
    let (at, message) = invalid(&with_handler("states: \"[a, 0\""));
    assert_eq!(at, "scenes[0].handlers[0].states");
    assert!(message.contains("offset"), "{}", message);
}

#[test]
fn strict_states_reject_undeclared() {
    let src = r#"
strict_states: true
states:
  - name: a
scenes:
  - triggers: [a]
    handlers:
      - states: "[a] & [b]"
"#;
    let (at, message) = invalid(src);
    assert_eq!(at, "scenes[0].handlers[0].states");
    assert_eq!(message, "undeclared state `b`");
}

#[test]
fn indefinite_hold_must_be_async() {
    let (at, _) = invalid(&with_handler("operations:\n  - op: hold\n    key: w"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].seconds");

    let p = load_from_str(&with_handler(
        "operations:\n  - op: hold\n    key: w\n    async: true",
    ))
    .expect("load");
    let op = &p.scenes[0].handlers[0].operations[0];
    assert!(op.is_async);
    assert_eq!(
        op.kind,
        OpKind::Hold {
            key: GameKey::MoveForward,
            seconds: None
        }
    );
}

#[test]
fn op_field_checks() {
    let (at, _) = invalid(&with_handler("operations:\n  - op: wait\n    seconds: 1\n    key: e"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].key");

    let (at, _) = invalid(&with_handler("operations:\n  - op: press\n    key: e\n    repeat: 0"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].repeat");

    let (at, message) = invalid(&with_handler("operations:\n  - op: switch\n    target: \"3\""));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].target");
    assert!(message.contains("`next` or `prev`"));

    let (at, _) = invalid(&with_handler("operations:\n  - op: set_state"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].state");

    let (at, _) = invalid(&with_handler("operations:\n  - op: wait\n    seconds: -1"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].seconds");

    let (at, message) = invalid(&with_handler("operations:\n  - op: wait\n    seconds: 1e20"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].seconds");
    assert!(message.contains("at most"), "{}", message);

    let (at, _) = invalid(&with_handler(
        "operations:\n  - op: press\n    key: e\n    pre_delay: 100000",
    ));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].pre_delay");

    let (at, _) = invalid(&with_handler("operations:\n  - key: e"));
    assert_eq!(at, "scenes[0].handlers[0].operations[0].op");
}

#[test]
fn scene_checks() {
    let (at, _) = invalid("scenes: []\n");
    assert_eq!(at, "scenes");

    let (at, _) = invalid("scenes:\n  - label: empty\n");
    assert_eq!(at, "scenes[0].handlers");

    let (at, _) = invalid("scenes:\n  - interval: -1\n    handlers:\n      - label: x\n");
    assert_eq!(at, "scenes[0].interval");

    let (at, _) = invalid("scenes:\n  - interval: 1e300\n    handlers:\n      - label: x\n");
    assert_eq!(at, "scenes[0].interval");

    let (at, _) = invalid(
        "scenes:\n  - label: a\n    handlers: [{label: x}]\n  - label: a\n    handlers: [{label: y}]\n",
    );
    assert_eq!(at, "scenes[1].label");
}

#[test]
fn state_declaration_checks() {
    let (at, _) = invalid("states:\n  - name: a\n  - name: a\nscenes: [{handlers: [{label: x}]}]\n");
    assert_eq!(at, "states[1].name");

    let (at, _) = invalid("states:\n  - name: \"a,b\"\nscenes: [{handlers: [{label: x}]}]\n");
    assert_eq!(at, "states[0].name");
}

#[test]
fn yaml_errors_carry_location() {
    let src = "name: x\nbogus: 1\nscenes: []\n";
    match load_from_str(src) {
        Err(Error::Parse {
            line,
            message,
            excerpt,
            ..
        }) => {
            assert_eq!(line, 2);
            assert!(message.contains("bogus"));
            assert!(excerpt.contains("bogus: 1"));
            assert!(excerpt.contains('^'));
        }
        other => panic!("expected parse error, got {:?}", other),
    }

    let err = load_from_str(&with_handler("operations:\n  - op: jump")).expect_err("bad op");
    assert!(matches!(err, Error::Parse { .. }), "{:?}", err);
}

#[test]
fn load_from_path_checks_extension_and_names_by_stem() {
    let err = load_from_path(Path::new("profile.rhai")).expect_err("extension");
    assert!(matches!(err, Error::Read { .. }));

    let dir = env::temp_dir().join(format!("chorebot-config-{}", process::id()));
    fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join("farming.yaml");
    fs::write(&path, "scenes:\n  - handlers:\n      - label: idle\n").expect("write");
    let p = load_from_path(&path).expect("load");
    assert_eq!(p.name, "farming");

    fs::write(&path, "scenes: []\n").expect("write");
    let err = load_from_path(&path).expect_err("invalid");
    assert_eq!(err.path(), Some(path.as_path()));
    assert!(err.pretty().contains("farming.yaml"));

    let missing = dir.join("missing.yml");
    assert!(matches!(
        load_from_path(&missing),
        Err(Error::Read { .. })
    ));
    let _ignored = fs::remove_dir_all(&dir);
}
