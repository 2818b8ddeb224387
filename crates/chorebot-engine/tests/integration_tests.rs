use std::{sync::Arc, time::Duration};

use chorebot_engine::{
    ConditionalOperator, Error, EventBus, ManualClock, Tick,
    test_support::{drain, recv_until, services},
};
use chorebot_protocol::{EngineState, NotifyKind, StatusMsg, ipc::StatusRx};
use chorebot_state::StateEvent;
use gamekey::GameKey;
use relaykey::RecordingPoster;
use tokio::time;

const FLASH_ONLY: &str = r#"
name: flash-only
states:
  - name: dodge-flash-yellow
    mutex_group: flash
  - name: dodge-flash-red
    mutex_group: flash
scenes:
  - label: flash
    triggers: [dodge-flash-yellow]
    interval: 0.5
    priority: 10
    handlers:
      - states: "[dodge-flash-yellow, 0, 1]"
        operations:
          - op: press
            key: dodge
"#;

const PRIORITIES: &str = r#"
name: priorities
scenes:
  - label: low
    priority: 10
    handlers:
      - states: "[busy, 0, 0.15]"
        operations:
          - op: hold
            key: lock
            seconds: 5
  - label: lower
    priority: 5
    handlers:
      - states: "[other]"
        operations:
          - op: press
            key: interact
  - label: high
    priority: 20
    handlers:
      - states: "[alarm]"
        operations:
          - op: press
            key: dodge
"#;

/// Test engine wired to a recording poster and a manual clock at 100s.
struct Harness {
    engine: ConditionalOperator,
    poster: Arc<RecordingPoster>,
    clock: Arc<ManualClock>,
    bus: EventBus,
    rx: StatusRx,
}

fn harness(src: &str) -> Harness {
    let profile = config::load_from_str(src).expect("profile");
    let poster = Arc::new(RecordingPoster::new());
    let clock = Arc::new(ManualClock::new(100.0));
    let (svc, rx) = services(poster.clone(), clock.clone());
    let bus = svc.bus.clone();
    let engine = ConditionalOperator::new(&profile, svc).expect("engine");
    Harness {
        engine,
        poster,
        clock,
        bus,
        rx,
    }
}

fn started(scene: &str) -> Tick {
    Tick::Started {
        scene: scene.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dodge_scenario_presses_once() {
    let h = harness(FLASH_ONLY);
    h.engine
        .update_state("dodge-flash-yellow", StateEvent::at(100.0))
        .expect("update");

    assert_eq!(h.engine.tick_at(100.5), started("flash"));
    assert!(h.engine.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(h.poster.downs(GameKey::Dodge), 1);
    assert_eq!(h.poster.ups(GameKey::Dodge), 1);

    assert_eq!(h.engine.tick_at(101.5), Tick::Nothing);
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.poster.downs(GameKey::Dodge), 1);
    h.engine.dispose();
}

#[tokio::test(flavor = "multi_thread")]
async fn mutex_peer_event_clears_condition() {
    let h = harness(FLASH_ONLY);
    h.engine
        .update_state("dodge-flash-yellow", StateEvent::at(100.0))
        .expect("update");
    h.engine
        .update_state("dodge-flash-red", StateEvent::at(100.2))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.5), Tick::Nothing);
    assert_eq!(h.poster.downs(GameKey::Dodge), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn preemption_is_gated_by_priority() {
    let mut h = harness(PRIORITIES);
    h.engine
        .update_state("busy", StateEvent::at(100.0))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.1), started("low"));
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.poster.downs(GameKey::Lock), 1);

    // a lower priority scene cannot interrupt
    h.engine
        .update_state("other", StateEvent::at(100.2))
        .expect("update");
    assert_eq!(
        h.engine.tick_at(100.2),
        Tick::Ignored {
            scene: "lower".into()
        }
    );
    assert_eq!(h.engine.running_scene().as_deref(), Some("low"));

    // a higher one can, and the hold is released
    h.engine
        .update_state("alarm", StateEvent::at(100.3))
        .expect("update");
    assert_eq!(
        h.engine.tick_at(100.3),
        Tick::Preempted {
            from: "low".into(),
            to: "high".into()
        }
    );
    assert!(h.engine.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(h.poster.ups(GameKey::Lock), 1);
    assert_eq!(h.poster.downs(GameKey::Dodge), 1);
    assert_eq!(h.poster.downs(GameKey::Interact), 0);

    time::sleep(Duration::from_millis(20)).await;
    let msgs = drain(&mut h.rx);
    assert!(msgs.contains(&StatusMsg::ScenePreempted {
        scene: "low".into(),
        by: "high".into()
    }));
    assert!(msgs.contains(&StatusMsg::SceneFinished {
        scene: "low".into(),
        completed: false
    }));
}

#[tokio::test(flavor = "multi_thread")]
async fn running_scene_continues_when_selected_again() {
    let h = harness(PRIORITIES);
    h.engine
        .update_state("busy", StateEvent::at(100.0))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.05), started("low"));
    time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.engine.tick_at(100.1), Tick::Continued);
    assert_eq!(h.poster.downs(GameKey::Lock), 1);
    h.engine.stop_running();
    assert_eq!(h.poster.ups(GameKey::Lock), 1);
    assert!(h.engine.wait_idle(Duration::from_secs(1)).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_running_releases_and_is_idempotent() {
    let src = r#"
name: holder
tick_ms: 5
scenes:
  - label: walk
    interval: 0.5
    handlers:
      - states: "[go]"
        operations:
          - op: hold
            key: move_forward
            async: true
"#;
    let mut h = harness(src);
    h.engine
        .update_state("go", StateEvent::at(100.0))
        .expect("update");
    h.engine.start_running_async().expect("start");
    assert!(h.engine.is_running());
    assert!(
        recv_until(&mut h.rx, 1000, |m| matches!(m, StatusMsg::SceneStarted { scene, .. } if scene == "walk"))
            .await
    );
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.poster.downs(GameKey::MoveForward), 1);

    h.engine.stop_running();
    assert!(!h.engine.is_running());
    assert_eq!(h.poster.ups(GameKey::MoveForward), 1);
    assert!(
        recv_until(&mut h.rx, 500, |m| matches!(
            m,
            StatusMsg::Engine {
                state: EngineState::Stopped,
                ..
            }
        ))
        .await
    );

    h.engine.stop_running();
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.poster.ups(GameKey::MoveForward), 1);
    assert!(
        !drain(&mut h.rx)
            .iter()
            .any(|m| matches!(m, StatusMsg::Engine { .. }))
    );

    // stopped engines may start again
    h.engine.start_running_async().expect("restart");
    assert!(h.engine.is_running());
    h.engine.dispose();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_op_aborts_list_and_notifies() {
    let src = r#"
scenes:
  - label: strike
    handlers:
      - states: "[target]"
        operations:
          - op: press
            key: dodge
          - op: press
            key: interact
"#;
    let mut h = harness(src);
    h.poster.fail_on(GameKey::Dodge);
    h.engine
        .update_state("target", StateEvent::at(100.0))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.0), started("strike"));
    assert!(
        recv_until(&mut h.rx, 1000, |m| matches!(
            m,
            StatusMsg::Notify { kind: NotifyKind::Warn, title, .. } if title == "press dodge"
        ))
        .await
    );
    assert!(
        recv_until(&mut h.rx, 1000, |m| *m
            == StatusMsg::SceneFinished {
                scene: "strike".into(),
                completed: false
            })
        .await
    );
    assert_eq!(h.poster.downs(GameKey::Interact), 0);
    assert_eq!(h.engine.running_scene(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn bus_event_wakes_triggered_scene() {
    let src = r#"
tick_ms: 10
scenes:
  - label: flash
    interval: 3600
    triggers: [flash]
    handlers:
      - states: "[flash, 0, 1]"
        operations:
          - op: press
            key: e
"#;
    let mut h = harness(src);
    h.engine.start_running_async().expect("start");
    time::sleep(Duration::from_millis(40)).await;
    assert_eq!(h.poster.downs(GameKey::SpecialAttack), 0);

    h.clock.set(200.0);
    assert!(h.bus.dispatch_event("flash", StateEvent::at(200.0)));
    assert!(
        recv_until(&mut h.rx, 1000, |m| matches!(m, StatusMsg::SceneStarted { scene, .. } if scene == "flash"))
            .await
    );
    assert_eq!(
        h.engine
            .states()
            .record("flash")
            .and_then(|r| r.last_record_time()),
        Some(200.0)
    );
    assert!(h.engine.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(h.poster.downs(GameKey::SpecialAttack), 1);
    h.engine.dispose();
}

#[tokio::test(flavor = "multi_thread")]
async fn disposed_engine_refuses_work() {
    let h = harness(FLASH_ONLY);
    h.engine.dispose();
    assert!(matches!(h.engine.start_running_async(), Err(Error::Disposed)));
    assert!(!h.bus.dispatch_event("dodge-flash-yellow", StateEvent::at(100.0)));
    h.engine
        .update_state("dodge-flash-yellow", StateEvent::at(100.0))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.5), Tick::Nothing);
    h.engine.dispose();
}

#[tokio::test(flavor = "multi_thread")]
async fn preemption_releases_keys_pressed_down() {
    let src = r#"
scenes:
  - label: walk
    priority: 1
    handlers:
      - states: "[go]"
        operations:
          - op: press
            key: move_forward
            way: down
          - op: wait
            seconds: 5
  - label: flee
    priority: 9
    handlers:
      - states: "[alarm]"
        operations:
          - op: press
            key: dodge
"#;
    let h = harness(src);
    h.engine
        .update_state("go", StateEvent::at(100.0))
        .expect("update");
    assert_eq!(h.engine.tick_at(100.0), started("walk"));
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.poster.downs(GameKey::MoveForward), 1);
    assert_eq!(h.poster.ups(GameKey::MoveForward), 0);

    h.engine
        .update_state("alarm", StateEvent::at(100.1))
        .expect("update");
    assert_eq!(
        h.engine.tick_at(100.1),
        Tick::Preempted {
            from: "walk".into(),
            to: "flee".into()
        }
    );
    assert_eq!(h.poster.ups(GameKey::MoveForward), 1);
    assert!(h.engine.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(h.poster.downs(GameKey::Dodge), 1);
    h.engine.dispose();
}

#[test]
fn oversized_wait_is_rejected_at_load() {
    let src = r#"
scenes:
  - label: low
    handlers:
      - states: "[go]"
        operations:
          - op: wait
            seconds: 1e20
"#;
    assert!(matches!(
        config::load_from_str(src),
        Err(config::Error::Validation { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_list_starts_after_stop_returns() {
    let src = r#"
tick_ms: 1
scenes:
  - label: guard
    interval: 0
    handlers:
      - states: "[go]"
        operations:
          - op: hold
            key: lock
            seconds: 5
"#;
    let h = harness(src);
    h.engine
        .update_state("go", StateEvent::at(100.0))
        .expect("update");
    for round in 0..40u64 {
        h.engine.start_running_async().expect("start");
        time::sleep(Duration::from_micros(200 * (round % 7))).await;
        h.engine.stop_running();
        assert_eq!(h.engine.running_scene(), None, "round {round}");
        time::sleep(Duration::from_millis(5)).await;
        assert_eq!(h.engine.running_scene(), None, "round {round}");
        assert_eq!(
            h.poster.downs(GameKey::Lock),
            h.poster.ups(GameKey::Lock),
            "round {round}"
        );
    }
    h.engine.dispose();
}
