#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{sync::Arc, time::Duration};

use {
    common::{Agents, ConcurrencyTracker, GENERATE, Harness, ScriptedAgent, message},
    rstest::rstest,
    tokio_util::sync::CancellationToken,
    trinity_agents::{ParamValue, param},
    trinity_channels::InboundSink,
    trinity_common::ChannelId,
    trinity_config::SchedulePolicy,
    trinity_orchestrator::{BatchScheduler, IntakeBuffer, SchedulerOptions},
};

fn scheduler(h: &Harness, intake: &Arc<IntakeBuffer>, options: SchedulerOptions) -> BatchScheduler {
    BatchScheduler::new(Arc::clone(intake), Arc::clone(&h.pipeline), options)
}

async fn wait_for_sends(h: &Harness, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.outbound.sent().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("replies were not sent in time");
}

#[tokio::test]
async fn channels_are_processed_in_ascending_order() {
    let h = Harness::new(Agents {
        choose: ScriptedAgent::new("choose").always("message_id: 2"),
        ..Agents::default()
    });
    let intake = Arc::new(IntakeBuffer::new());
    intake.enqueue(message(7, "carol", "evening all"));
    intake.enqueue(message(7, "dave", "who's cooking tonight?"));
    intake.enqueue(message(7, "erin", "any dinner ideas?"));
    intake.enqueue(message(3, "alice", "morning"));

    let report = scheduler(&h, &intake, SchedulerOptions::default())
        .run_cycle()
        .await;

    let order: Vec<ChannelId> = report.runs.iter().map(|r| r.channel_id).collect();
    assert_eq!(order, vec![ChannelId(3), ChannelId(7)]);

    // Only the three-message batch needs a choice.
    assert_eq!(h.choose.call_count(), 1);
    let ParamValue::Text(shown) = h.choose.calls()[0].get(param::MESSAGES).clone() else {
        panic!("choose saw no messages");
    };
    assert!(shown.contains("evening all") && shown.contains("any dinner ideas?"));
    assert!(!shown.contains("morning"));
    assert_eq!(report.runs[0].selection_index, 0);
    assert_eq!(report.runs[1].selection_index, 2);
    assert!(!report.runs[1].selection_fallback);
    assert_eq!(
        h.generate.calls()[1].get(param::USER_MESSAGE),
        &ParamValue::text("any dinner ideas?")
    );

    let sent: Vec<ChannelId> = h.outbound.sent().into_iter().map(|(c, _)| c).collect();
    assert_eq!(sent, vec![ChannelId(3), ChannelId(7)]);
    assert!(intake.is_empty());
}

#[tokio::test]
async fn empty_intake_runs_nothing() {
    let h = Harness::new(Agents::default());
    let intake = Arc::new(IntakeBuffer::new());
    let report = scheduler(&h, &intake, SchedulerOptions::default())
        .run_cycle()
        .await;
    assert_eq!(report.processed(), 0);
    assert_eq!(h.thought.call_count(), 0);
}

#[tokio::test]
async fn failed_channel_does_not_stop_the_cycle() {
    let h = Harness::new(Agents::default());
    h.outbound.fail_for(ChannelId(3));
    let intake = Arc::new(IntakeBuffer::new());
    intake.enqueue(message(3, "alice", "morning"));
    intake.enqueue(message(7, "carol", "evening all"));

    let report = scheduler(&h, &intake, SchedulerOptions::default())
        .run_cycle()
        .await;

    assert_eq!(report.failed, vec![ChannelId(3)]);
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].channel_id, ChannelId(7));
    assert_eq!(report.processed(), 2);
}

#[rstest]
#[case("message_id: 2", 2, false)]
#[case("message_id: 7", 0, true)]
#[case("no idea", 0, true)]
#[tokio::test]
async fn batch_selection(#[case] reply: &str, #[case] index: usize, #[case] fallback: bool) {
    let h = Harness::new(Agents {
        choose: ScriptedAgent::new("choose").always(reply),
        ..Agents::default()
    });
    let intake = Arc::new(IntakeBuffer::new());
    for (author, text) in [("alice", "first"), ("bob", "second"), ("carol", "third")] {
        intake.enqueue(message(5, author, text));
    }

    let report = scheduler(&h, &intake, SchedulerOptions::default())
        .run_cycle()
        .await;

    assert_eq!(report.runs[0].selection_index, index);
    assert_eq!(report.runs[0].selection_fallback, fallback);
    assert_eq!(h.choose.call_count(), 1);

    let expected = ["first", "second", "third"][index];
    let thought = &h.thought.calls()[0];
    assert_eq!(thought.get(param::USER_MESSAGE), &ParamValue::text(expected));
    let formatted = thought.get(param::NEW_MESSAGES).render().unwrap();
    assert!(formatted.contains("ID: 0"));
    assert!(formatted.contains("ID: 2"));

    // The whole batch is remembered, not only the selected message.
    assert_eq!(h.store.records()[0].batch.len(), 3);
}

#[tokio::test]
async fn runs_never_overlap() {
    let tracker = Arc::new(ConcurrencyTracker::default());
    let h = Harness::new(Agents {
        thought: ScriptedAgent::new("thought")
            .always(common::THOUGHT)
            .with_delay(Duration::from_millis(20))
            .tracked(tracker.clone()),
        generate: ScriptedAgent::new("generate")
            .always(GENERATE)
            .with_delay(Duration::from_millis(20))
            .tracked(tracker.clone()),
        ..Agents::default()
    });

    let first = {
        let pipeline = Arc::clone(&h.pipeline);
        tokio::spawn(async move { pipeline.process_batch(vec![message(1, "alice", "one")]).await })
    };
    let second = {
        let pipeline = Arc::clone(&h.pipeline);
        tokio::spawn(async move { pipeline.process_batch(vec![message(2, "bob", "two")]).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(tracker.max(), 1);
    assert_eq!(h.outbound.sent().len(), 2);
}

#[rstest]
#[case(SchedulePolicy::Poll)]
#[case(SchedulePolicy::WakeOnEnqueue)]
#[tokio::test]
async fn loop_picks_up_messages_until_cancelled(#[case] policy: SchedulePolicy) {
    let h = Harness::new(Agents::default());
    let intake = Arc::new(IntakeBuffer::new());
    let scheduler = Arc::new(scheduler(&h, &intake, SchedulerOptions {
        idle_interval: Duration::from_millis(25),
        policy,
    }));
    let cancel = CancellationToken::new();

    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    intake.on_message(message(3, "alice", "anyone here?"));
    wait_for_sends(&h, 1).await;
    intake.on_message(message(8, "bob", "hello"));
    wait_for_sends(&h, 2).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn enqueue_wakes_a_long_idle_wait() {
    let h = Harness::new(Agents::default());
    let intake = Arc::new(IntakeBuffer::new());
    let scheduler = Arc::new(scheduler(&h, &intake, SchedulerOptions {
        idle_interval: Duration::from_secs(600),
        policy: SchedulePolicy::WakeOnEnqueue,
    }));
    let cancel = CancellationToken::new();
    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    intake.enqueue(message(3, "alice", "wake up"));
    wait_for_sends(&h, 1).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn cancelled_before_start_returns_immediately() {
    let h = Harness::new(Agents::default());
    let intake = Arc::new(IntakeBuffer::new());
    intake.enqueue(message(3, "alice", "too late"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(
        Duration::from_secs(1),
        scheduler(&h, &intake, SchedulerOptions::default()).run(cancel),
    )
    .await
    .expect("scheduler ignored cancellation");

    assert!(h.outbound.sent().is_empty());
    assert!(!intake.is_empty());
}
