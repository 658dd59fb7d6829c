//! End-to-end runtime behavior against the fake server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hearth_core::commands::{CommandDefinition, CommandResult, Permission};
use hearth_core::events::{Cancellable, EventPriority};
use hearth_core::impl_event;
use hearth_platform_fake::{FakeConsole, FakePlayer, FakeServer};

#[derive(Debug)]
struct PlayerJoinedEvent {
    player: String,
}

impl_event!(PlayerJoinedEvent);

#[derive(Debug)]
struct ChatEvent {
    message: String,
    cancelled: bool,
}

impl ChatEvent {
    fn saying(message: &str) -> Self {
        Self {
            message: message.to_string(),
            cancelled: false,
        }
    }
}

impl Cancellable for ChatEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl_event!(ChatEvent, cancellable);

#[test]
fn ping_command_round_trip() {
    let server = FakeServer::new();
    let context = server.create_context("pinger");
    context
        .commands()
        .register(CommandDefinition::new("ping", |ctx| {
            ctx.sender.send_message("pong");
            CommandResult::Success
        }))
        .unwrap();

    let player = Arc::new(FakePlayer::named("Alice"));
    let result = server.dispatch_command(player.clone(), "ping", &[]);

    assert_eq!(result, CommandResult::Success);
    assert_eq!(player.messages(), vec!["pong"]);
    assert!(server.platform().recording_sink().is_registered("ping"));
}

#[test]
fn unknown_labels_come_back_as_not_found() {
    let server = FakeServer::new();
    server.create_context("empty");

    let result = server.dispatch_command(Arc::new(FakeConsole), "doesnotexist", &[]);
    assert_eq!(result, CommandResult::NotFound);
}

#[test]
fn commands_route_to_the_owning_plugin() {
    let server = FakeServer::new();
    let warp = server.create_context("warp");
    let home = server.create_context("home");

    warp.commands()
        .register(CommandDefinition::new("warp", |_| CommandResult::Success))
        .unwrap();
    home.commands()
        .register(CommandDefinition::new("home", |_| {
            CommandResult::UsageError("usage: /home <name>".to_string())
        }))
        .unwrap();

    assert_eq!(
        server.dispatch_command(Arc::new(FakeConsole), "warp", &[]),
        CommandResult::Success
    );
    assert_eq!(
        server.dispatch_command(Arc::new(FakeConsole), "home", &[]),
        CommandResult::UsageError("usage: /home <name>".to_string())
    );
}

#[test]
fn permission_gate_applies_before_the_executor() {
    let server = FakeServer::new();
    let context = server.create_context("admin");
    context
        .commands()
        .register(
            CommandDefinition::new("stop", |_| CommandResult::Success)
                .with_permission(Permission::new("hearth.admin.stop")),
        )
        .unwrap();

    let player = Arc::new(FakePlayer::named("Mallory"));
    assert_eq!(
        server.dispatch_command(player.clone(), "stop", &[]),
        CommandResult::NoPermission
    );

    player.grant("hearth.admin.stop");
    assert_eq!(
        server.dispatch_command(player, "stop", &[]),
        CommandResult::Success
    );
}

#[test]
fn events_reach_every_plugin_in_priority_order() {
    let server = FakeServer::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let greeter = server.create_context("greeter");
    let metrics = server.create_context("metrics");

    let greeter_log = log.clone();
    greeter
        .events()
        .subscribe(EventPriority::Normal, false, move |event: &mut PlayerJoinedEvent| {
            greeter_log
                .lock()
                .unwrap()
                .push(format!("greeter:{}", event.player));
            Ok(())
        })
        .unwrap();

    let metrics_log = log.clone();
    metrics
        .events()
        .subscribe(EventPriority::Final, true, move |event: &mut PlayerJoinedEvent| {
            metrics_log
                .lock()
                .unwrap()
                .push(format!("metrics:{}", event.player));
            Ok(())
        })
        .unwrap();

    server.post(&mut PlayerJoinedEvent {
        player: "Alice".to_string(),
    });

    assert_eq!(
        *log.lock().unwrap(),
        vec!["greeter:Alice", "metrics:Alice"]
    );
}

#[test]
fn chat_filter_vetoes_for_later_listeners_across_plugins() {
    let server = FakeServer::new();
    let delivered = Arc::new(AtomicU64::new(0));
    let observed_cancelled = Arc::new(AtomicU64::new(0));

    let filter = server.create_context("filter");
    filter
        .events()
        .subscribe(EventPriority::Early, false, |event: &mut ChatEvent| {
            if event.message.contains("spam") {
                event.set_cancelled(true);
            }
            Ok(())
        })
        .unwrap();

    let chat = server.create_context("chat");
    let deliveries = delivered.clone();
    chat.events()
        .subscribe(EventPriority::Normal, false, move |_: &mut ChatEvent| {
            deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let audits = observed_cancelled.clone();
    chat.events()
        .subscribe(EventPriority::Final, true, move |event: &mut ChatEvent| {
            if event.is_cancelled() {
                audits.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .unwrap();

    server.post(&mut ChatEvent::saying("hello world"));
    server.post(&mut ChatEvent::saying("buy spam now"));

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(observed_cancelled.load(Ordering::SeqCst), 1);
}

#[test]
fn delayed_and_repeating_tasks_follow_the_manual_tick() {
    let server = FakeServer::new();
    let context = server.create_context("timers");
    let delayed_ran = Arc::new(AtomicU64::new(0));
    let repeats = Arc::new(AtomicU64::new(0));

    let delayed = delayed_ran.clone();
    context
        .scheduler()
        .run_delayed(5, move || {
            delayed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let repeat_counter = repeats.clone();
    let handle = context
        .scheduler()
        .run_repeating(1, 2, move || {
            repeat_counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    server.tick_many(4);
    assert_eq!(delayed_ran.load(Ordering::SeqCst), 0);
    assert_eq!(repeats.load(Ordering::SeqCst), 2); // ticks 1 and 3

    server.tick();
    assert_eq!(delayed_ran.load(Ordering::SeqCst), 1);
    assert_eq!(repeats.load(Ordering::SeqCst), 3); // tick 5

    // Cancelled after its 3rd firing; it must never fire a 4th time.
    handle.cancel();
    server.tick_many(10);
    assert_eq!(repeats.load(Ordering::SeqCst), 3);
}

#[test]
fn teardown_detaches_a_plugin_from_the_server() {
    let server = FakeServer::new();
    let context = server.create_context("shortlived");
    let hits = Arc::new(AtomicU64::new(0));

    let listener_hits = hits.clone();
    context
        .events()
        .on(move |_: &mut PlayerJoinedEvent| {
            listener_hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    context
        .commands()
        .register(CommandDefinition::new("bye", |_| CommandResult::Success))
        .unwrap();
    let task_hits = hits.clone();
    context
        .scheduler()
        .run_repeating(1, 1, move || {
            task_hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    context.teardown();

    server.post(&mut PlayerJoinedEvent {
        player: "Bob".to_string(),
    });
    server.tick_many(3);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(
        server.dispatch_command(Arc::new(FakeConsole), "bye", &[]),
        CommandResult::NotFound
    );
}
