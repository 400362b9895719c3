//! End-to-end debug session tests over a real localhost connection.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use hindsight::session::{ClientEvent, SessionEvent};
use hindsight::{
    ComponentId, DebugSessionManager, DebugSettings, Property, ServerAddress, Value,
};

use super::common::counter::{self, Msg};

const WAIT: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn started_manager() -> (
    DebugSessionManager,
    ServerAddress,
    broadcast::Receiver<SessionEvent>,
) {
    let settings = DebugSettings {
        host: "127.0.0.1".to_string(),
        port: free_port().to_string(),
        detailed_output: false,
    };
    let mut manager = DebugSessionManager::new(settings);
    let events = manager.subscribe();
    manager.start().await.unwrap();
    let address = ServerAddress::new("127.0.0.1", manager.local_addr().unwrap().port());
    (manager, address, events)
}

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn counter_state(count: i64) -> Value {
    Value::reference(
        "CounterState",
        vec![Property::new("count", Value::int(count))],
    )
}

#[tokio::test]
async fn test_attach_and_snapshot_flow() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let _attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;
    let debug = manager.server().component(&component).await.unwrap();
    assert_eq!(debug.state, counter_state(0));
    assert!(debug.snapshots().is_empty());

    handle.send(Msg::Increment).await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotAppended { .. })
    })
    .await;

    let debug = manager.server().component(&component).await.unwrap();
    assert_eq!(debug.state, counter_state(1));
    assert_eq!(
        debug.snapshots()[0].message,
        Some(Value::reference("Msg::Increment", vec![]))
    );

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_apply_message_round_trip() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let _attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;

    let call_id = manager
        .server()
        .apply_message(
            &component,
            Value::reference("Msg::Add", vec![Property::new("0", Value::int(5))]),
        )
        .await
        .unwrap();

    let ack = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ActionApplied { .. })
    })
    .await;
    let SessionEvent::ActionApplied {
        call_id: acked, ..
    } = ack
    else {
        unreachable!();
    };
    assert_eq!(acked, call_id);
    assert!(manager.server().pending_directives().is_empty());

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotAppended { .. })
    })
    .await;
    assert_eq!(handle.current().count, 5);
    let debug = manager.server().component(&component).await.unwrap();
    assert_eq!(debug.state, counter_state(5));

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_apply_state_bypasses_update() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let _attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;

    manager
        .server()
        .apply_state(&component, counter_state(42))
        .await
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ActionApplied { .. })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotAppended { .. })
    })
    .await;

    assert_eq!(handle.current().count, 42);
    let debug = manager.server().component(&component).await.unwrap();
    // Injected states have no triggering message.
    assert_eq!(debug.snapshots().last().unwrap().message, None);
    assert_eq!(debug.state, counter_state(42));

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_directive_reports_exception() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let _attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;

    manager
        .server()
        .apply_message(&component, Value::reference("Mystery", vec![]))
        .await
        .unwrap();

    let exception = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Exception { .. })
    })
    .await;
    let SessionEvent::Exception { reason, .. } = exception else {
        unreachable!();
    };
    assert!(reason.contains("unknown type"), "reason: {reason}");

    // The exception settles the directive in place of an ack, and the
    // component keeps running.
    assert!(manager.server().pending_directives().is_empty());
    assert_eq!(handle.current().count, 0);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_command_resolution_streams_every_transition() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let _attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;

    // Load keeps the count at 0 but issues FetchTen, whose message adds 10.
    handle.send(Msg::Load).await.unwrap();
    for _ in 0..2 {
        wait_for(&mut events, |e| {
            matches!(e, SessionEvent::SnapshotAppended { .. })
        })
        .await;
    }

    let debug = manager.server().component(&component).await.unwrap();
    assert_eq!(debug.snapshots().len(), 2);
    assert_eq!(
        debug.snapshots()[0].message,
        Some(Value::reference("Msg::Load", vec![]))
    );
    assert_eq!(
        debug.snapshots()[0].commands,
        Value::collection(vec![Value::reference("Cmd::FetchTen", vec![])])
    );
    assert_eq!(
        debug.snapshots()[1].message,
        Some(Value::reference(
            "Msg::Add",
            vec![Property::new("0", Value::int(10))]
        ))
    );
    assert_eq!(debug.state, counter_state(10));

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_detach_removes_component() {
    let (mut manager, address, mut events) = started_manager().await;
    let component = ComponentId::new("counter");

    let handle = counter::spawn_counter("counter");
    let attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;

    drop(attachment);
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentDetached { .. })
    })
    .await;
    assert!(manager.server().component(&component).await.is_none());

    // The component itself keeps running without its debugger.
    handle.send(Msg::Increment).await.unwrap();
    assert!(handle.is_running());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_observes_connection_lifecycle() {
    let (mut manager, address, mut events) = started_manager().await;

    let handle = counter::spawn_counter("counter");
    let mut attachment = hindsight::connect(&address, handle.clone(), counter::shared_codec())
        .await
        .unwrap();

    let connected = timeout(WAIT, attachment.next_event()).await.unwrap();
    assert!(matches!(connected, Some(ClientEvent::Connected { .. })));

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ComponentAttached { .. })
    })
    .await;
    handle.send(Msg::Increment).await.unwrap();
    let sent = timeout(WAIT, async {
        loop {
            match attachment.next_event().await {
                Some(ClientEvent::SnapshotSent { .. }) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(sent);

    // Server shutdown severs the connection; the client notices.
    manager.stop().await.unwrap();
    let disconnected = timeout(WAIT, async {
        loop {
            match attachment.next_event().await {
                Some(ClientEvent::Disconnected) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(disconnected);
}
