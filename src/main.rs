//! Purpose: `hostlist` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Client commands reach the host only through `HttpGateway`.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod serve;

use hostlist::api::{
    Error, ErrorKind, GrowthPolicy, HelpFormatting, HttpGateway, ListDirection, MessageKey,
    MessageQueue, QueueIdentity, QueuedMessage, ReceiveAction, ReceiveOptions, ReceiveSelection,
    ReceivedMessage, RecordCount, RemoveSelection, SelectionCriteria, StartAt, WaitTime,
    to_exit_code,
};
use hostlist::core::format::rfc3339;

const DEFAULT_URL: &str = "http://127.0.0.1:9710";
const DEFAULT_BIND: &str = "127.0.0.1:9710";
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `hostlist --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let default_level = if matches!(cli.command, Command::Serve(_)) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_level);

    let connection = Connection {
        url: cli.url,
        token: cli.token,
    };
    command_dispatch::dispatch_command(cli.command, connection)
        .map_err(add_transport_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "hostlist",
    version,
    about = "List, receive and send host message queue messages",
    long_about = None,
    after_help = r#"EXAMPLES
  $ hostlist serve --queue QGPL/DEMO                # Terminal 1: bridge over an in-memory host
  $ hostlist send QGPL/DEMO "backup finished"       # Terminal 2
  $ hostlist list QGPL/DEMO --newest-first
  $ hostlist receive QGPL/DEMO --action remove

NOTES
  - Queues are LIBRARY/QUEUE or *CURRENT (the bridge user's own queue)
  - Keys are 8 hex digits as printed by `list` and `send`"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "HOSTLIST_URL",
        default_value = DEFAULT_URL,
        help = "Bridge base URL"
    )]
    url: String,
    #[arg(long, global = true, env = "HOSTLIST_TOKEN", help = "Bearer token for the bridge")]
    token: Option<String>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum HelpFormatCli {
    None,
    Return,
    Substitute,
}

impl From<HelpFormatCli> for HelpFormatting {
    fn from(value: HelpFormatCli) -> Self {
        match value {
            HelpFormatCli::None => HelpFormatting::None,
            HelpFormatCli::Return => HelpFormatting::ReturnFormattingCharacters,
            HelpFormatCli::Substitute => HelpFormatting::SubstituteFormattingCharacters,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ActionCli {
    Old,
    Remove,
    Same,
}

impl From<ActionCli> for ReceiveAction {
    fn from(value: ActionCli) -> Self {
        match value {
            ActionCli::Old => ReceiveAction::Old,
            ActionCli::Remove => ReceiveAction::Remove,
            ActionCli::Same => ReceiveAction::Same,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "List messages on a queue",
        after_help = r#"EXAMPLES
  $ hostlist list QGPL/DEMO
  $ hostlist list QGPL/DEMO --severity 30 --needs-reply
  $ hostlist list --newest-first --count 5 --help-format substitute"#
    )]
    List(ListArgs),
    #[command(
        about = "Receive one message",
        after_help = r#"EXAMPLES
  $ hostlist receive QGPL/DEMO                       # oldest new message, marked old
  $ hostlist receive QGPL/DEMO --action remove --wait 30
  $ hostlist receive QGPL/DEMO --selection next --key 00000004"#
    )]
    Receive(ReceiveArgs),
    #[command(
        arg_required_else_help = true,
        about = "Send an informational or inquiry message",
        after_help = r#"EXAMPLES
  $ hostlist send QGPL/DEMO "nightly save complete"
  $ hostlist send QGPL/OPER "Mount tape 2 (G C)" --reply-queue QGPL/DEMO"#
    )]
    Send(SendArgs),
    #[command(arg_required_else_help = true, about = "Answer an inquiry message by key")]
    Reply(ReplyArgs),
    #[command(
        arg_required_else_help = true,
        about = "Remove messages from a queue",
        after_help = r#"EXAMPLES
  $ hostlist remove QGPL/DEMO --key 00000003
  $ hostlist remove QGPL/DEMO --keep-unanswered"#
    )]
    Remove(RemoveArgs),
    #[command(
        about = "Serve an in-memory host over the bridge protocol",
        after_help = r#"NOTES
  - Loopback-only unless --allow-non-loopback (which also requires --token)
  - Queues given with --queue are created empty at startup"#
    )]
    Serve(ServeArgs),
    #[command(about = "Print version info")]
    Version,
}

#[derive(Args)]
struct QueueArg {
    #[arg(default_value = "*CURRENT", help = "Queue as LIBRARY/QUEUE or *CURRENT")]
    queue: String,
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    queue: QueueArg,
    #[arg(long, default_value_t = 0, help = "Minimum severity (0-99)")]
    severity: i32,
    #[arg(long, help = "List newest messages first")]
    newest_first: bool,
    #[arg(long, help = "Include messages that need a reply")]
    needs_reply: bool,
    #[arg(long, help = "Include messages that need no reply")]
    no_reply_needed: bool,
    #[arg(long, help = "Include sender's copies that need a reply")]
    senders_copy: bool,
    #[arg(long, value_enum, default_value = "none", help = "Help text formatting")]
    help_format: HelpFormatCli,
    #[arg(long, value_name = "KEY", help = "Start listing at this message key")]
    start_key: Option<String>,
    #[arg(long, default_value_t = 1, help = "First record to return (1-based)")]
    start: u32,
    #[arg(long, help = "Number of records to return (default: all)")]
    count: Option<u32>,
    #[arg(long, help = "Truncate message text to this many bytes")]
    max_message_len: Option<u32>,
    #[arg(long, help = "Truncate help text to this many bytes")]
    max_help_len: Option<u32>,
    #[arg(long, value_name = "BYTES", help = "Largest receiver buffer to grow to")]
    max_buffer: Option<usize>,
}

#[derive(Args)]
struct ReceiveArgs {
    #[command(flatten)]
    queue: QueueArg,
    #[arg(
        long,
        default_value = "any",
        help = "any|comp|copy|diag|first|info|inq|last|next|prv|rpy"
    )]
    selection: String,
    #[arg(long, value_name = "KEY", help = "Reference message key")]
    key: Option<String>,
    #[arg(long, default_value = "0", help = "Seconds to wait, or `forever`")]
    wait: String,
    #[arg(long, value_enum, default_value = "old", help = "What to do with the message")]
    action: ActionCli,
    #[arg(long, value_name = "BYTES", help = "Initial receiver buffer size")]
    buffer_len: Option<usize>,
}

#[derive(Args)]
struct SendArgs {
    #[arg(help = "Queue as LIBRARY/QUEUE or *CURRENT")]
    queue: String,
    #[arg(help = "Message text")]
    text: String,
    #[arg(long, value_name = "QUEUE", help = "Send an inquiry whose reply goes to this queue")]
    reply_queue: Option<String>,
}

#[derive(Args)]
struct ReplyArgs {
    #[arg(help = "Queue holding the inquiry")]
    queue: String,
    #[arg(help = "Inquiry message key")]
    key: String,
    #[arg(help = "Reply text")]
    text: String,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RemoveWhich {
    #[arg(long, value_name = "KEY", help = "Remove one message by key")]
    key: Option<String>,
    #[arg(long, help = "Remove every message")]
    all: bool,
    #[arg(long, help = "Remove all but unanswered inquiries")]
    keep_unanswered: bool,
    #[arg(long, help = "Remove messages already received")]
    old: bool,
    #[arg(long, help = "Remove messages not yet received")]
    new: bool,
}

#[derive(Args)]
struct RemoveArgs {
    #[arg(help = "Queue as LIBRARY/QUEUE or *CURRENT")]
    queue: String,
    #[command(flatten)]
    which: RemoveWhich,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_BIND, help = "Bind address")]
    bind: String,
    #[arg(long = "queue", value_name = "QUEUE", help = "Queue to create at startup (repeatable)")]
    queues: Vec<String>,
    #[arg(long, help = "Allow binding to a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, help = "Request body limit")]
    max_body_bytes: usize,
}

struct Connection {
    url: String,
    token: Option<String>,
}

impl Connection {
    fn open_queue(&self, queue: &str) -> Result<MessageQueue, Error> {
        let queue: QueueIdentity = queue.parse()?;
        let mut gateway = HttpGateway::new(self.url.clone())?;
        if let Some(token) = &self.token {
            gateway = gateway.with_token(token.clone());
        }
        Ok(MessageQueue::new(Arc::new(gateway), queue))
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn parse_key(raw: &str) -> Result<MessageKey, Error> {
    raw.parse::<MessageKey>()
        .map_err(|err| err.with_hint("Keys are 8 hex digits, e.g. 0000002A."))
}

fn parse_wait(raw: &str) -> Result<WaitTime, Error> {
    if raw.eq_ignore_ascii_case("forever") {
        return Ok(WaitTime::Forever);
    }
    match raw.parse::<u32>() {
        Ok(0) => Ok(WaitTime::NoWait),
        Ok(seconds) => Ok(WaitTime::Seconds(seconds)),
        Err(_) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid wait {raw:?}"))
            .with_hint("Use a number of seconds or `forever`.")),
    }
}

fn parse_bind(raw: &str) -> Result<SocketAddr, Error> {
    raw.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:9710.")
    })
}

fn criteria_from_args(args: &ListArgs) -> Result<SelectionCriteria, Error> {
    let direction = if args.newest_first {
        ListDirection::NewestFirst
    } else {
        ListDirection::OldestFirst
    };
    let start_key = args.start_key.as_deref().map(parse_key).transpose()?;
    let mut criteria = SelectionCriteria::new()
        .with_severity(args.severity)
        .with_direction(direction)
        .with_help_formatting(args.help_format.into())
        .with_start(start_key, None);
    if args.needs_reply || args.no_reply_needed || args.senders_copy {
        criteria = criteria.with_inclusion(args.needs_reply, args.no_reply_needed, args.senders_copy);
    }
    criteria.max_message_len = args.max_message_len;
    criteria.max_help_len = args.max_help_len;
    Ok(criteria)
}

fn growth_policy(max_buffer: Option<usize>) -> GrowthPolicy {
    let mut policy = GrowthPolicy::default();
    if let Some(max_len) = max_buffer {
        policy.max_len = max_len;
    }
    policy
}

fn receive_options_from_args(args: &ReceiveArgs) -> Result<ReceiveOptions, Error> {
    let mut options = ReceiveOptions::new(ReceiveSelection::parse(&args.selection)?)
        .with_wait(parse_wait(&args.wait)?)
        .with_action(args.action.into());
    if let Some(key) = args.key.as_deref() {
        options = options.with_key(parse_key(key)?);
    }
    if let Some(buffer_len) = args.buffer_len {
        options = options.with_buffer_len(buffer_len);
    }
    Ok(options)
}

fn remove_selection(which: &RemoveWhich) -> Result<RemoveSelection, Error> {
    if let Some(key) = which.key.as_deref() {
        return Ok(RemoveSelection::Key(parse_key(key)?));
    }
    let selection = if which.all {
        RemoveSelection::All
    } else if which.keep_unanswered {
        RemoveSelection::KeepUnanswered
    } else if which.old {
        RemoveSelection::Old
    } else if which.new {
        RemoveSelection::New
    } else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("remove needs a selection")
            .with_hint("Pass --key, --all, --keep-unanswered, --old or --new."));
    };
    Ok(selection)
}

fn queued_message_json(message: &QueuedMessage) -> Value {
    json!({
        "key": message.key.to_string(),
        "severity": message.severity,
        "id": message.message_id,
        "type": message.message_type.to_string(),
        "type_code": message.message_type.code(),
        "file": qualified_name(&message.message_file_library, &message.message_file),
        "queue": qualified_name(&message.queue_library, &message.queue),
        "text": message.text,
        "help": message.help,
        "substitution_data": hex(&message.substitution_data),
        "default_reply": message.default_reply,
        "sender_job": message.sender_job,
        "reply_status": message.reply_status.map(|status| status.code()),
        "sent_at": message.sent_at.and_then(rfc3339),
    })
}

fn received_message_json(message: &ReceivedMessage) -> Value {
    json!({
        "key": message.key.to_string(),
        "severity": message.severity,
        "id": message.message_id,
        "type": message.message_type.to_string(),
        "type_code": message.message_type.code(),
        "file": qualified_name(&message.message_file_library, &message.message_file),
        "sender": {
            "job": message.sender_job,
            "user": message.sender_user,
            "number": message.sender_job_number,
            "program": message.sender_program,
        },
        "text": message.text,
        "help": message.help,
        "substitution_data": hex(&message.substitution_data),
        "reply_status": message.reply_status.map(|status| status.code()),
        "sent_at": message.sent_at.and_then(rfc3339),
        "truncated": message.truncated,
    })
}

fn qualified_name(library: &str, name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else if library.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{library}/{name}"))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn add_transport_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Transport || err.hint().is_some() {
        return err;
    }
    err.with_hint("The host call failed. Check host_messages for the host's diagnostics.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Transport => "host call failed".to_string(),
        ErrorKind::ListStatus => "list is not usable".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(format!("{status:?}")));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    if !err.host_messages().is_empty() {
        let messages = err
            .host_messages()
            .iter()
            .map(|message| {
                json!({
                    "id": message.id,
                    "severity": message.severity,
                    "text": message.text,
                })
            })
            .collect::<Vec<_>>();
        inner.insert("host_messages".to_string(), json!(messages));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let label = if use_color {
        "\u{1b}[31merror:\u{1b}[0m"
    } else {
        "error:"
    };
    let mut lines = vec![format!("{label} {}", error_message(err))];
    for message in err.host_messages() {
        lines.push(format!(
            "  {} (severity {}): {}",
            message.id, message.severity, message.text
        ));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
