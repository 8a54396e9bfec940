//! Mount, unmount and prop updates of a bound light.

mod common;

use common::{light_map, settle, Light, LightData};
use fsm_binder::debug_log::DisplayResult;
use fsm_binder::prelude::*;

fn binder(dev_mode: bool, debug_set: Option<DebugSet>) -> Binder<LightData> {
    let mut builder = Binder::builder(light_map()).dev_mode(dev_mode);
    if let Some(debug_set) = debug_set {
        builder = builder.debug_set(debug_set);
    }
    builder.build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn mount_publishes_snapshots_after_init() {
    let binder = binder(false, None);
    let mut state = binder.state();

    let adapter = binder.mount().unwrap();
    assert_eq!(binder.phase(), LifecyclePhase::Active);
    settle().await;
    assert!(!state.has_changed().unwrap());

    adapter.change_state(LightData::go());
    settle().await;
    assert_eq!(
        *state.borrow_and_update(),
        Snapshot::Active(LightData::go())
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_mount_keeps_one_adapter() {
    let binder = binder(false, None);
    let first = binder.mount().unwrap();
    let second = binder.mount().unwrap();
    assert_eq!(first.id(), second.id());
}

#[tokio::test(start_paused = true)]
async fn unmount_outside_dev_mode_destroys_now() {
    let binder = binder(false, None);
    let adapter = binder.mount().unwrap();

    binder.unmount();

    assert_eq!(binder.phase(), LifecyclePhase::Destroyed);
    assert!(adapter.is_destroyed());
    assert!(binder.adapter().is_none());
}

#[tokio::test(start_paused = true)]
async fn remount_after_destroy_builds_fresh_adapter_with_props() {
    let binder = binder(false, None);
    let first = binder.mount().unwrap();
    binder
        .set_props(&FsmConfigPatch::new().debug_log_buffer_count(3))
        .unwrap();
    binder.unmount();

    let second = binder.mount().unwrap();
    assert_ne!(first.id(), second.id());
    assert!(second.current_state().data.is_uninitialized());
    assert_eq!(second.config().debug_log_buffer_count, 3);
}

#[tokio::test(start_paused = true)]
async fn hot_reload_remount_cancels_deferred_destroy() {
    let binder = binder(true, None);
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());

    binder.unmount();
    assert_eq!(binder.phase(), LifecyclePhase::TearingDown);
    let remounted = binder.mount().unwrap();
    settle().await;

    assert_eq!(binder.phase(), LifecyclePhase::Active);
    assert_eq!(remounted.id(), adapter.id());
    assert!(!adapter.is_destroyed());
    assert_eq!(adapter.current_state().state(), Some(Light::Go));
}

#[tokio::test(start_paused = true)]
async fn hot_reload_destroys_after_one_tick() {
    let binder = binder(true, None);
    let adapter = binder.mount().unwrap();

    binder.unmount();
    assert!(!adapter.is_destroyed());
    settle().await;

    assert!(adapter.is_destroyed());
    assert_eq!(binder.phase(), LifecyclePhase::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn hot_reload_keeps_publishing_after_remount() {
    let debug_set = DebugSet::new();
    let binder = binder(true, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();
    binder.unmount();
    binder.mount().unwrap();
    settle().await;

    let mut log = debug_set.debug_log();
    adapter.change_state(LightData::go());
    settle().await;

    let rows = log.borrow_and_update().clone().unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn outside_destroy_releases_the_adapter() {
    let binder = binder(false, None);
    let adapter = binder.mount().unwrap();

    adapter.destroy();
    settle().await;

    assert_eq!(binder.phase(), LifecyclePhase::Destroyed);
    assert!(binder.adapter().is_none());
}

#[tokio::test(start_paused = true)]
async fn outside_destroy_during_teardown_finishes_it() {
    let binder = binder(true, None);
    let adapter = binder.mount().unwrap();
    binder.unmount();

    adapter.destroy();
    settle().await;
    assert_eq!(binder.phase(), LifecyclePhase::Destroyed);
    assert!(binder.adapter().is_none());

    let fresh = binder.mount().unwrap();
    assert_ne!(fresh.id(), adapter.id());
    assert_eq!(binder.phase(), LifecyclePhase::Active);
}

#[tokio::test(start_paused = true)]
async fn debug_outputs_follow_transitions() {
    let debug_set = DebugSet::new();
    let binder = binder(true, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();

    adapter.change_state(LightData::go());
    adapter.change_state(LightData::stop());
    settle().await;

    let rows = debug_set.debug_log().borrow().clone().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].result, DisplayResult::Warning);
    assert_eq!(rows[1].data, "{\n \"state\": \"go\"\n}");

    let diagram = debug_set.diagram().borrow().clone().unwrap();
    assert!(diagram.contains("class go highlight"));
}

#[tokio::test(start_paused = true)]
async fn toggling_debug_log_publishes_or_clears() {
    let debug_set = DebugSet::new();
    let binder = binder(false, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    settle().await;
    assert!(debug_set.debug_log().borrow().is_none());

    binder
        .set_props(&FsmConfigPatch::new().output_debug_log(true))
        .unwrap();
    assert_eq!(debug_set.debug_log().borrow().as_ref().map(Vec::len), Some(1));

    binder
        .set_props(&FsmConfigPatch::new().output_debug_log(false))
        .unwrap();
    assert!(debug_set.debug_log().borrow().is_none());
}

#[tokio::test(start_paused = true)]
async fn shrinking_buffer_caps_and_republishes_log() {
    let debug_set = DebugSet::new();
    let binder = binder(true, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    adapter.change_state(LightData::prepare_to_stop());
    adapter.change_state(LightData::stop());
    settle().await;

    binder
        .set_props(&FsmConfigPatch::new().debug_log_buffer_count(1))
        .unwrap();

    assert_eq!(adapter.debug_log().len(), 1);
    let rows = debug_set.debug_log().borrow().clone().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].data.contains("stop"));
}

#[tokio::test(start_paused = true)]
async fn buffer_is_capped_without_a_debug_set() {
    let binder = binder(false, None);
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    adapter.change_state(LightData::prepare_to_stop());

    binder
        .set_props(&FsmConfigPatch::new().debug_log_buffer_count(1))
        .unwrap();
    assert_eq!(adapter.debug_log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn direction_change_regenerates_diagram() {
    let debug_set = DebugSet::new();
    let binder = binder(true, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    settle().await;
    assert!(debug_set
        .diagram()
        .borrow()
        .as_deref()
        .is_some_and(|text| text.contains("direction TB")));

    binder
        .set_props(&FsmConfigPatch::new().state_diagram_direction(DiagramDirection::LeftToRight))
        .unwrap();

    let diagram = debug_set.diagram().borrow().clone().unwrap();
    assert!(diagram.contains("direction LR"));
    assert!(diagram.contains("class go highlight"));
}

#[tokio::test(start_paused = true)]
async fn disabling_diagram_clears_it() {
    let debug_set = DebugSet::new();
    let binder = binder(true, Some(debug_set.clone()));
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    settle().await;

    binder
        .set_props(&FsmConfigPatch::new().output_state_diagram(false))
        .unwrap();
    assert!(debug_set.diagram().borrow().is_none());
}

#[tokio::test(start_paused = true)]
async fn override_prop_applies_once() {
    let binder = binder(false, None);
    let adapter = binder.mount().unwrap();
    adapter.change_state(LightData::go());
    let mut overrides = adapter.on_override_applied();

    let patch = FsmConfigPatch::new().state_override(LightData::stop());
    binder.set_props(&patch).unwrap();
    binder.set_props(&patch).unwrap();

    assert!(overrides.try_recv().is_ok());
    assert!(overrides.try_recv().is_err());
    assert_eq!(adapter.current_state().state(), Some(Light::Stop));
}

#[tokio::test(start_paused = true)]
async fn invalid_props_are_rejected() {
    let binder = binder(false, None);
    binder.mount().unwrap();

    let result = binder.set_props(&FsmConfigPatch::new().debug_log_buffer_count(0));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
    assert_eq!(
        binder.adapter().unwrap().config().debug_log_buffer_count,
        fsm_binder::config::DEFAULT_DEBUG_LOG_BUFFER_COUNT
    );
}

#[tokio::test(start_paused = true)]
async fn named_binder_registers_and_unregisters() {
    let registry = Registry::new();
    let binder: Binder<LightData> = Binder::builder(light_map())
        .defaults(FsmConfigPatch::new().name("crossing"))
        .dev_mode(false)
        .registry(registry.clone())
        .build()
        .unwrap();

    binder.mount().unwrap();
    assert!(registry.contains("crossing"));

    binder.unmount();
    settle().await;
    assert!(!registry.contains("crossing"));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_binder_destroys_its_adapter() {
    let binder = binder(true, None);
    let adapter = binder.mount().unwrap();
    drop(binder);
    assert!(adapter.is_destroyed());
}
