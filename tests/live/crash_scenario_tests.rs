//! A crashing automation run against real RabbitMQ dead-letters exactly once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lapin::options::{ExchangeDeleteOptions, QueueDeclareOptions, QueueDeleteOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jira_automation::models::issue::IssueSnapshot;
use jira_automation::models::task::Task;
use jira_automation::queue::amqp::AmqpConnector;
use jira_automation::queue::{
    BoxFuture, ChannelManager, QueueTopology, TaskConsumer, TaskHandler, TaskPublisher,
};
use jira_automation::{AppError, Result};

fn broker_url() -> String {
    std::env::var("RABBITMQ_URL").expect("RABBITMQ_URL must be set for live tests")
}

/// Fails every task and remembers what it saw.
#[derive(Default)]
struct CrashingHandler {
    seen: Mutex<Vec<(String, String)>>,
}

impl TaskHandler for CrashingHandler {
    fn handle<'a>(&'a self, task: Task, txn_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.seen
                .lock()
                .expect("lock")
                .push((task.issue_key.clone(), txn_id.to_owned()));
            Err(AppError::Handler(format!("automation crashed for {}", task.issue_key)))
        })
    }
}

/// Ready message count of an existing queue.
async fn ready_count(channel: &Channel, queue: &str) -> u32 {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                passive: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .expect("passive declare")
        .message_count()
}

#[tokio::test]
async fn crashed_task_lands_in_dead_letter_queue() {
    let suffix = Uuid::new_v4().simple().to_string();
    let work_queue = format!("jira-tasks-live-{suffix}");
    let dead_letter_queue = format!("jira-tasks-dlq-live-{suffix}");
    let exchange = format!("dlx-live-{suffix}");
    let topology = QueueTopology::new(&work_queue, &dead_letter_queue, &exchange);

    let url = broker_url();
    let publisher_channels = Arc::new(ChannelManager::new(Arc::new(AmqpConnector::new(&url))));
    let consumer_channels = Arc::new(ChannelManager::new(Arc::new(AmqpConnector::new(&url))));
    let publisher = TaskPublisher::new(Arc::clone(&publisher_channels), topology.clone());
    let consumer = TaskConsumer::new(Arc::clone(&consumer_channels), topology.clone());

    let issue = IssueSnapshot {
        id: "10001".into(),
        key: "PROJ-1".into(),
        summary: "Add login page".into(),
        labels: vec!["ai-automate".into()],
        repository_urls: vec!["https://github.com/acme/api".into()],
        ..IssueSnapshot::default()
    };
    publisher
        .publish(&Task::new(issue, 1_700_000_000_000, "123456"), "123456")
        .await
        .expect("publish");

    let handler = Arc::new(CrashingHandler::default());
    let ct = CancellationToken::new();
    let run = {
        let handler = Arc::clone(&handler) as Arc<dyn TaskHandler>;
        let ct = ct.clone();
        tokio::spawn(async move { consumer.run(&handler, &ct).await })
    };

    let inspector = Connection::connect(&url, ConnectionProperties::default())
        .await
        .expect("inspector connection");
    let channel = inspector.create_channel().await.expect("inspector channel");

    let mut dead = 0;
    for _ in 0..100 {
        dead = ready_count(&channel, &dead_letter_queue).await;
        if dead == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(dead, 1, "task reaches the dead-letter queue");
    assert_eq!(ready_count(&channel, &work_queue).await, 0);
    assert_eq!(
        *handler.seen.lock().expect("lock"),
        vec![("PROJ-1".to_owned(), "123456".to_owned())]
    );

    ct.cancel();
    run.await.expect("join").expect("clean shutdown");
    publisher_channels.close().await;
    consumer_channels.close().await;

    channel
        .queue_delete(&work_queue, QueueDeleteOptions::default())
        .await
        .expect("delete work queue");
    channel
        .queue_delete(&dead_letter_queue, QueueDeleteOptions::default())
        .await
        .expect("delete dead-letter queue");
    channel
        .exchange_delete(&exchange, ExchangeDeleteOptions::default())
        .await
        .expect("delete exchange");
    inspector.close(200, "Bye").await.expect("close inspector");
}
