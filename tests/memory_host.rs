//! Purpose: In-process scenarios for queues served by the memory host.
//! Exports: None (integration test module).
//! Role: Exercise list, receive, send, reply and remove without a network hop.
//! Invariants: Every test closes its queues and leaves no list handle open.

use hostlist::api::{
    ErrorKind, GrowthPolicy, HelpFormatting, ListDirection, ListStatus, MessageQueue, MessageType,
    QueueIdentity, ReceiveAction, ReceiveOptions, ReceiveSelection, RecordCount, RemoveSelection,
    ReplyStatus, SelectionCriteria, StartAt, WaitTime,
};
use hostlist::host::{MemoryHost, NewMessage, QueueAccess};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn setup(names: &[&str]) -> (Arc<MemoryHost>, Vec<QueueIdentity>) {
    let host = Arc::new(MemoryHost::new());
    let queues = names
        .iter()
        .map(|name| {
            let queue = QueueIdentity::qualified("QGPL", *name).expect("queue");
            host.create_queue(&queue).expect("create")
        })
        .collect();
    (host, queues)
}

fn open(host: &Arc<MemoryHost>, queue: &QueueIdentity) -> MessageQueue {
    MessageQueue::new(host.clone(), queue.clone())
}

#[test]
fn empty_queue_receive_is_not_found() {
    let (host, queues) = setup(&["DEMO"]);
    let queue = open(&host, &queues[0]);
    let options = ReceiveOptions::new(ReceiveSelection::Any)
        .with_action(ReceiveAction::Remove)
        .with_wait(WaitTime::NoWait);
    let received = queue.receive(&options).expect("receive");
    assert!(received.message().is_none());
    queue.close().expect("close");
}

#[test]
fn sent_messages_list_in_both_directions() {
    let (host, queues) = setup(&["DEMO"]);
    let queue = open(&host, &queues[0]);
    for text in ["first", "second", "third"] {
        queue.send_informational(text).expect("send");
    }

    let oldest: Vec<_> = queue
        .all_messages()
        .expect("list")
        .into_iter()
        .map(|message| message.text)
        .collect();
    assert_eq!(oldest, ["first", "second", "third"]);

    queue
        .set_criteria(SelectionCriteria::new().with_direction(ListDirection::NewestFirst))
        .expect("criteria");
    let newest = queue.all_messages().expect("list");
    assert_eq!(newest[0].text, "third");
    assert_eq!(newest[0].message_type, MessageType::Informational);
    assert!(newest.windows(2).all(|pair| pair[0].key > pair[1].key));

    queue.close().expect("close");
    assert!(host.open_lists().is_empty());
}

#[test]
fn severity_and_paging_select_a_window() {
    let (host, queues) = setup(&["DEMO"]);
    for severity in [10, 20, 30, 40] {
        host.post(
            &queues[0],
            NewMessage::new(MessageType::Diagnostic, format!("sev {severity}"))
                .with_severity(severity),
        )
        .expect("post");
    }
    let queue = open(&host, &queues[0]);
    queue
        .set_criteria(SelectionCriteria::new().with_severity(20))
        .expect("criteria");
    assert_eq!(queue.len().expect("len"), 3);

    let page = queue
        .messages(StartAt::Record(2), RecordCount::Exactly(2))
        .expect("page");
    let texts: Vec<_> = page.iter().map(|message| message.text.as_str()).collect();
    assert_eq!(texts, ["sev 30", "sev 40"]);
    queue.close().expect("close");
}

#[test]
fn small_buffers_grow_until_the_page_fits() {
    let (host, queues) = setup(&["DEMO"]);
    for i in 0..40 {
        host.post(
            &queues[0],
            NewMessage::new(MessageType::Informational, format!("message number {i:03}")),
        )
        .expect("post");
    }
    let policy = GrowthPolicy {
        initial_len: 256,
        ..GrowthPolicy::default()
    };
    let queue = open(&host, &queues[0]).with_policy(policy);
    let result = queue
        .session()
        .fetch(StartAt::Record(1), RecordCount::All)
        .expect("fetch");
    assert_eq!(result.records_returned, 40);
    assert!(result.attempts > 1);
    assert!(result.buffer_len >= result.data.len());
    assert_eq!(result.entries().expect("decode").len(), 40);
    queue.close().expect("close");
}

#[test]
fn lists_stay_snapshots_until_invalidated() {
    let (host, queues) = setup(&["DEMO"]);
    let queue = open(&host, &queues[0]);
    queue.send_informational("one").expect("send");
    assert_eq!(queue.len().expect("len"), 1);

    host.post(&queues[0], NewMessage::new(MessageType::Informational, "two"))
        .expect("post");
    assert_eq!(queue.len().expect("len"), 1);

    queue.session().invalidate();
    assert_eq!(queue.len().expect("len"), 2);
    queue.close().expect("close");
    assert!(host.open_lists().is_empty());
}

#[test]
fn inquiry_reply_round_trip() {
    let (host, queues) = setup(&["OPER", "DEMO"]);
    let operator = open(&host, &queues[0]);
    let sender = open(&host, &queues[1]);

    let inquiry_key = operator
        .send_inquiry("Mount tape 2 (G C)", queues[1].clone())
        .expect("inquiry");

    operator
        .set_criteria(SelectionCriteria::new().with_inclusion(true, false, false))
        .expect("criteria");
    let waiting = operator.all_messages().expect("list");
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].key, inquiry_key);
    assert_eq!(waiting[0].reply_status, Some(ReplyStatus::Waiting));

    let copy = sender
        .receive(&ReceiveOptions::new(ReceiveSelection::Any))
        .expect("receive copy");
    let copy = copy.message().expect("sender's copy").clone();
    assert_eq!(copy.message_type, MessageType::SendersCopy);

    operator.reply(inquiry_key, "G").expect("reply");
    assert!(operator.all_messages().expect("list").is_empty());
    let err = operator.reply(inquiry_key, "C").expect_err("answered twice");
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.host_messages()[0].id, "CPF2420");

    let reply = sender
        .receive(&ReceiveOptions::new(ReceiveSelection::Reply).with_key(copy.key))
        .expect("receive reply");
    let reply = reply.message().expect("reply");
    assert_eq!(reply.text, "G");
    assert!(reply.message_type.is_reply());

    operator.close().expect("close");
    sender.close().expect("close");
}

#[test]
fn truncated_receive_is_fetched_again_in_full() {
    let (host, queues) = setup(&["DEMO"]);
    let help = "Recovery . . . :   Retry the request.&N".repeat(60);
    host.post(
        &queues[0],
        NewMessage::new(MessageType::Informational, "x".repeat(300)).with_help(help.clone()),
    )
    .expect("post");

    let queue = open(&host, &queues[0]);
    let received = queue
        .receive(&ReceiveOptions::new(ReceiveSelection::First).with_buffer_len(200))
        .expect("receive");
    let message = received.message().expect("message");
    assert!(!message.truncated);
    assert_eq!(message.text.len(), 300);
    assert_eq!(message.help, help);
    queue.close().expect("close");
}

#[test]
fn help_formatting_modes() {
    let (host, queues) = setup(&["DEMO"]);
    host.post(
        &queues[0],
        NewMessage::new(MessageType::Informational, "text").with_help("Cause:&N Recovery:&P Retry."),
    )
    .expect("post");
    let queue = open(&host, &queues[0]);

    let plain = queue.all_messages().expect("list");
    assert!(!plain[0].help.contains('&'));
    assert!(!plain[0].help.contains('\n'));

    queue
        .set_criteria(
            SelectionCriteria::new()
                .with_help_formatting(HelpFormatting::ReturnFormattingCharacters),
        )
        .expect("criteria");
    assert!(queue.all_messages().expect("list")[0].help.contains("&N"));

    queue
        .set_criteria(
            SelectionCriteria::new()
                .with_help_formatting(HelpFormatting::SubstituteFormattingCharacters),
        )
        .expect("criteria");
    let substituted = &queue.all_messages().expect("list")[0].help;
    assert!(substituted.contains("\nRecovery:"));
    assert!(substituted.contains("\n      Retry."));
    queue.close().expect("close");
}

#[test]
fn waiting_receive_wakes_on_arrival() {
    let (host, queues) = setup(&["DEMO"]);
    let poster = host.clone();
    let target = queues[0].clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        poster
            .post(&target, NewMessage::new(MessageType::Informational, "late"))
            .expect("post");
    });

    let queue = open(&host, &queues[0]);
    let started = Instant::now();
    let received = queue
        .receive(&ReceiveOptions::new(ReceiveSelection::Any).with_wait(WaitTime::Seconds(5)))
        .expect("receive");
    handle.join().expect("poster");
    assert_eq!(received.message().expect("message").text, "late");
    assert!(started.elapsed() < Duration::from_secs(5));
    queue.close().expect("close");
}

#[test]
fn remove_selections() {
    let (host, queues) = setup(&["DEMO", "OPER"]);
    let queue = open(&host, &queues[0]);
    queue.send_informational("read me").expect("send");
    queue.send_informational("unread").expect("send");
    queue
        .send_inquiry("answer me", queues[1].clone())
        .expect("inquiry");

    queue
        .receive(&ReceiveOptions::new(ReceiveSelection::Any))
        .expect("receive");
    queue.remove(RemoveSelection::Old).expect("remove old");
    assert_eq!(queue.len().expect("len"), 2);

    queue.remove(RemoveSelection::KeepUnanswered).expect("keep");
    let left = queue.all_messages().expect("list");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].message_type, MessageType::Inquiry);

    queue.remove(RemoveSelection::Key(left[0].key)).expect("by key");
    assert!(queue.is_empty().expect("empty"));
    let err = queue
        .remove(RemoveSelection::Key(left[0].key))
        .expect_err("gone");
    assert_eq!(err.host_messages()[0].id, "CPF2410");
    queue.close().expect("close");
}

#[test]
fn locked_queue_is_a_list_status_error() {
    let (host, queues) = setup(&["DEMO"]);
    host.set_access(&queues[0], QueueAccess::Locked).expect("lock");
    let queue = open(&host, &queues[0]);
    let err = queue.all_messages().expect_err("locked");
    assert_eq!(err.kind(), ErrorKind::ListStatus);
    assert_eq!(host.open_lists().len(), 1);
    queue.close().expect("close");
    assert!(host.open_lists().is_empty());
}

#[test]
fn damaged_queue_still_lists_its_messages() {
    let (host, queues) = setup(&["DEMO"]);
    let queue = open(&host, &queues[0]);
    queue.send_informational("before damage").expect("send");
    queue.send_informational("  edge blanks survive   ").expect("send");
    host.set_access(&queues[0], QueueAccess::Damaged).expect("damage");

    let messages = queue.all_messages().expect("damaged lists decode");
    let texts: Vec<_> = messages.iter().map(|message| message.text.as_str()).collect();
    assert_eq!(texts, ["before damage", "  edge blanks survive   "]);
    let result = queue
        .session()
        .fetch(StartAt::Record(1), RecordCount::All)
        .expect("fetch");
    assert_eq!(result.status, ListStatus::Damaged);
    queue.close().expect("close");
    assert!(host.open_lists().is_empty());
}

#[test]
fn message_text_keeps_leading_and_trailing_blanks() {
    let (host, queues) = setup(&["DEMO"]);
    let queue = open(&host, &queues[0]);
    let text = "  indented text ends with spaces   ";
    queue.send_informational(text).expect("send");

    assert_eq!(queue.all_messages().expect("list")[0].text, text);
    let received = queue
        .receive(&ReceiveOptions::new(ReceiveSelection::First))
        .expect("receive");
    assert_eq!(received.message().expect("message").text, text);
    queue.close().expect("close");
}

#[test]
fn unknown_queue_carries_host_messages() {
    let host = Arc::new(MemoryHost::new());
    let queue = MessageQueue::new(
        host.clone(),
        QueueIdentity::qualified("NOLIB", "NOQ").expect("queue"),
    );
    let err = queue.len().expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.host_messages()[0].id, "CPF2403");
    queue.close().expect("nothing to close");
}

#[test]
fn current_queue_resolves_on_the_host() {
    let host = Arc::new(MemoryHost::new());
    let queue = MessageQueue::new(host.clone(), QueueIdentity::Current);
    queue.send_informational("to myself").expect("send");
    let messages = queue.all_messages().expect("list");
    assert_eq!(messages[0].queue, "HOSTLIST");
    assert_eq!(messages[0].queue_library, "QUSRSYS");
    queue.close().expect("close");
}
