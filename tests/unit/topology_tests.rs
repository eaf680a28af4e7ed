//! Work queue and dead-letter topology declaration.

use std::sync::Arc;

use jira_automation::config::BrokerConfig;
use jira_automation::queue::memory::InMemoryBroker;
use jira_automation::queue::{BrokerChannel, ExchangeKind, QueueOptions, QueueTopology};
use jira_automation::AppError;

fn topology() -> QueueTopology {
    QueueTopology::new("jira-tasks", "jira-tasks-dlq", "dlx-exchange")
}

fn channel(broker: &InMemoryBroker) -> Arc<dyn BrokerChannel> {
    broker.open_channel()
}

#[tokio::test]
async fn declares_all_entities() {
    let broker = InMemoryBroker::new();
    let queues = topology().ensure(&channel(&broker)).await.expect("ensure");

    assert_eq!(queues.work_queue, "jira-tasks");
    assert_eq!(queues.dead_letter_queue, "jira-tasks-dlq");
    assert!(broker.has_exchange("dlx-exchange", ExchangeKind::Direct, true));
    assert_eq!(
        broker.bindings("dlx-exchange"),
        vec![("jira-tasks".to_owned(), "jira-tasks-dlq".to_owned())]
    );

    let work = broker.queue_options("jira-tasks").expect("work queue");
    assert!(work.durable);
    assert_eq!(work.dead_letter_exchange.as_deref(), Some("dlx-exchange"));
    assert_eq!(work.dead_letter_routing_key.as_deref(), Some("jira-tasks"));

    let dlq = broker.queue_options("jira-tasks-dlq").expect("dead-letter queue");
    assert_eq!(dlq, QueueOptions::durable());
}

#[tokio::test]
async fn double_declaration_is_a_no_op() {
    let broker = InMemoryBroker::new();
    let channel = channel(&broker);

    topology().ensure(&channel).await.expect("first ensure");
    topology().ensure(&channel).await.expect("second ensure");

    assert_eq!(broker.queue_count(), 2);
    assert_eq!(broker.bindings("dlx-exchange").len(), 1);
    assert!(channel.is_open());
}

#[tokio::test]
async fn concurrent_declarations_agree() {
    let broker = InMemoryBroker::new();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let channel = channel(&broker);
            tokio::spawn(async move { topology().ensure(&channel).await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("ensure");
    }

    assert_eq!(broker.queue_count(), 2);
}

#[tokio::test]
async fn conflicting_work_queue_fails_loudly() {
    let broker = InMemoryBroker::new();
    let channel = channel(&broker);
    // Pre-existing work queue without dead-letter arguments.
    channel
        .declare_queue("jira-tasks", &QueueOptions::durable())
        .await
        .expect("plain declare");

    let err = topology()
        .ensure(&channel)
        .await
        .expect_err("conflicting declaration fails");
    assert!(matches!(err, AppError::Broker(_)));
    assert!(err.to_string().contains("PRECONDITION_FAILED"));
    assert!(!channel.is_open(), "broker closes the channel on conflict");
}

#[tokio::test]
async fn conflicting_exchange_name_fails() {
    let broker = InMemoryBroker::new();
    let channel = channel(&broker);
    channel
        .declare_exchange("dlx-exchange", ExchangeKind::Direct, false)
        .await
        .expect("transient exchange");

    let result = topology().ensure(&channel).await;
    assert!(matches!(result, Err(AppError::Broker(_))));
}

#[test]
fn builds_from_config() {
    let config = BrokerConfig {
        url: String::new(),
        work_queue: "a".into(),
        dead_letter_queue: "b".into(),
        dead_letter_exchange: "c".into(),
    };
    let topology = QueueTopology::from_config(&config);
    assert_eq!(topology.work_queue(), "a");
    assert_eq!(topology.dead_letter_queue(), "b");
    assert_eq!(topology.dead_letter_exchange(), "c");
    assert_eq!(
        topology.work_queue_options(),
        QueueOptions::durable().with_dead_letter("c", "a")
    );
}
