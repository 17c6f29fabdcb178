use std::sync::{Arc, Mutex};

use tether_core::{
    DeliveryContext, DeliveryQueue, LifecycleRegistry, LifecycleState, Observable, SourceExt,
    Subject, Visibility,
};
use tether_runtime::{
    BindManager, BindableExt, BinderConfig, Driver, DriverExt, PausePolicy, bindable_fn,
};

fn immediate<T: tether_core::Value>(driver: Driver<T>) -> Driver<T> {
    driver.deliver_on(DeliveryContext::immediate())
}

#[test]
fn owner_destroy_returns_registry_to_pre_bind_count() {
    let manager = BindManager::new();
    let before = manager.len();

    let owner = Arc::new(LifecycleRegistry::new());
    let title = Subject::new();
    let subtitle = Subject::new();
    let title_sink = Observable::new(String::new());
    let subtitle_sink = Observable::new(String::new());

    title_sink.bind(&manager, &owner, immediate(title.clone().into_driver_or_default()));
    subtitle_sink.bind(&manager, &owner, immediate(subtitle.clone().into_driver_or_default()));
    assert_eq!(manager.len(), before + 2);

    owner.move_to(LifecycleState::Resumed);
    title.emit("Inbox".to_string());
    subtitle.emit("3 unread".to_string());
    assert_eq!(title_sink.get(), "Inbox");
    assert_eq!(subtitle_sink.get(), "3 unread");

    owner.destroy();

    assert_eq!(manager.len(), before);
    assert_eq!(title.observer_count(), 0);
    assert_eq!(subtitle.observer_count(), 0);
    assert_eq!(owner.handler_count(), 0);
}

#[test]
fn repeated_teardown_reaps_once() {
    let manager = BindManager::new();
    let owner = Arc::new(LifecycleRegistry::resumed());
    let source = Subject::new();
    let handle = Observable::new(0).bind(&manager, &owner, immediate(source.into_driver(0)));
    let before = manager.len();

    owner.destroy();
    handle.unbind();
    handle.unbind();
    owner.destroy();

    assert_eq!(manager.len(), before - 1);
    assert_eq!(manager.stats().reaped, 1);
    assert!(!handle.is_bound());
}

#[test]
fn binding_to_destroyed_owner_leaves_nothing_behind() {
    let manager = BindManager::new();
    let owner = Arc::new(LifecycleRegistry::resumed());
    owner.destroy();

    let source = Subject::new();
    let sink = Observable::new(1);
    let handle = sink.bind(&manager, &owner, immediate(source.clone().into_driver(0)));

    assert!(!handle.is_bound());
    assert!(manager.is_empty());
    assert_eq!(source.observer_count(), 0);
    source.emit(5);
    assert_eq!(sink.get(), 1);
}

#[test]
fn release_policy_resubscribes_and_replays_current_state() {
    let manager = BindManager::with_config(BinderConfig::new().pause_policy(PausePolicy::Release));
    let owner = Arc::new(LifecycleRegistry::resumed());
    let progress = Observable::new(10);
    let label = Observable::new(String::new());

    label.bind(
        &manager,
        &owner,
        immediate(progress.clone().map(|p: i32| format!("{p}%")).into_driver_or_default()),
    );
    assert_eq!(label.get(), "10%");

    owner.move_to(LifecycleState::Stopped);
    progress.set(40);
    assert_eq!(label.get(), "10%");
    assert_eq!(progress.subscriber_count(), 0);

    owner.move_to(LifecycleState::Resumed);
    assert_eq!(label.get(), "40%");
    progress.set(41);
    assert_eq!(label.get(), "41%");
}

#[test]
fn retain_policy_keeps_updating_while_stopped() {
    let manager = BindManager::new();
    let owner = Arc::new(LifecycleRegistry::resumed());
    let progress = Observable::new(0);
    let sink = Observable::new(0);

    sink.bind(&manager, &owner, immediate(progress.clone().into_driver(0)));
    owner.move_to(LifecycleState::Stopped);
    progress.set(7);

    assert_eq!(sink.get(), 7);
    assert_eq!(manager.len(), 1);
}

#[test]
fn worker_emissions_land_on_the_delivery_queue() {
    let manager = BindManager::new();
    let queue = DeliveryQueue::new();
    let owner = Arc::new(LifecycleRegistry::resumed());
    let feed = Subject::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);

    manager.bind(
        &owner,
        bindable_fn(move |v: u32| s.lock().unwrap().push(v)),
        feed.clone()
            .into_driver(0)
            .deliver_on(DeliveryContext::queue(&queue)),
    );

    let worker = {
        let feed = feed.clone();
        std::thread::spawn(move || {
            for i in 1..=3 {
                feed.emit(i);
            }
        })
    };
    worker.join().unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(queue.run_pending(), 3);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn form_validation_drives_button_state() {
    let manager = BindManager::new();
    let screen = Arc::new(LifecycleRegistry::resumed());

    let first_name = Observable::new(String::new());
    let email = Observable::new(String::new());
    let name_valid = first_name.clone().map(|s: String| !s.is_empty());
    let email_valid = email.clone().map(|s: String| s.contains('@') && s.contains('.'));
    let enabled = name_valid
        .combine_latest(email_valid, |name: &bool, email: &bool| *name && *email)
        .into_driver(false);

    let email_error = email
        .clone()
        .map(|s: String| {
            if !s.is_empty() && !s.contains('@') {
                "Invalid email".to_string()
            } else {
                String::new()
            }
        })
        .into_driver_or_default();

    let button = Observable::new(true);
    let error_label = Observable::new("?".to_string());
    let error_visibility = Observable::new(Visibility::Visible);
    button.bind(&manager, &screen, immediate(enabled));
    error_label.bind(&manager, &screen, immediate(email_error.clone()));
    error_visibility.bind(
        &manager,
        &screen,
        immediate(email_error.map(|e| Visibility::collapse_unless(!e.is_empty()), Visibility::Gone)),
    );

    assert!(!button.get());
    assert_eq!(error_label.get(), "");
    assert_eq!(error_visibility.get(), Visibility::Gone);

    first_name.set("Ada".to_string());
    email.set("ada".to_string());
    assert!(!button.get());
    assert_eq!(error_label.get(), "Invalid email");
    assert_eq!(error_visibility.get(), Visibility::Visible);

    email.set("ada@example.com".to_string());
    assert!(button.get());
    assert_eq!(error_label.get(), "");

    screen.destroy();
    assert!(manager.is_empty());
    assert_eq!(first_name.subscriber_count(), 0);
    assert_eq!(email.subscriber_count(), 0);
}
