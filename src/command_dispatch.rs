//! Purpose: Hold top-level CLI command dispatch for `hostlist`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: A list opened by `list` is closed before returning, on error paths too.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    connection: Connection,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Version => {
            emit_json(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::List(args) => {
            let criteria = criteria_from_args(&args)?;
            let queue = connection
                .open_queue(&args.queue.queue)?
                .with_policy(growth_policy(args.max_buffer));
            let result = list_messages(&queue, criteria, args.start, args.count);
            let closed = queue.close();
            let value = result?;
            closed?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Receive(args) => {
            let options = receive_options_from_args(&args)?;
            let queue = connection.open_queue(&args.queue.queue)?;
            let received = queue.receive(&options)?;
            // NotFound is a normal answer: `message` is null and the exit code is 0.
            let message = received.message().map(received_message_json);
            emit_json(json!({ "message": message }));
            Ok(RunOutcome::ok())
        }
        Command::Send(args) => {
            let queue = connection.open_queue(&args.queue)?;
            let key = match args.reply_queue.as_deref() {
                Some(reply_queue) => queue.send_inquiry(&args.text, reply_queue.parse()?)?,
                None => queue.send_informational(&args.text)?,
            };
            emit_json(json!({
                "queue": queue.identity().to_string(),
                "key": key.to_string(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Reply(args) => {
            let key = parse_key(&args.key)?;
            let queue = connection.open_queue(&args.queue)?;
            queue.reply(key, &args.text)?;
            emit_json(json!({ "replied": key.to_string() }));
            Ok(RunOutcome::ok())
        }
        Command::Remove(args) => {
            let selection = remove_selection(&args.which)?;
            let queue = connection.open_queue(&args.queue)?;
            queue.remove(selection)?;
            emit_json(json!({ "removed": selection.as_str() }));
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let queues = args
                .queues
                .iter()
                .map(|queue| queue.parse::<QueueIdentity>())
                .collect::<Result<Vec<_>, _>>()?;
            let config = serve::ServeConfig {
                bind: parse_bind(&args.bind)?,
                token: connection.token,
                queues,
                allow_non_loopback: args.allow_non_loopback,
                max_body_bytes: args.max_body_bytes,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn list_messages(
    queue: &MessageQueue,
    criteria: SelectionCriteria,
    start: u32,
    count: Option<u32>,
) -> Result<Value, Error> {
    queue.set_criteria(criteria)?;
    let total = queue.len()?;
    let messages = match count {
        Some(count) => queue.messages(StartAt::Record(start), RecordCount::Exactly(count))?,
        None if start <= 1 => queue.all_messages()?,
        None => queue.messages(StartAt::Record(start), RecordCount::All)?,
    };
    Ok(json!({
        "queue": queue.identity().to_string(),
        "total": total,
        "messages": messages.iter().map(queued_message_json).collect::<Vec<_>>(),
    }))
}
