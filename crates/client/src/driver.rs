//! Line-oriented terminal front end over [`ChatCoordinator`].

use std::sync::Arc;

use mirra_gateway::{ConversationId, GatewayError, MessageId, create_gateway};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::coordinator::ChatCoordinator;
use crate::outcome::{MutationOutcome, Revert, SendOutcome};
use crate::settings::SettingsStore;

pub const HELP: &str = "\
commands:
  <text>               send a message
  /new [title]         create and open a conversation
  /switch <id>         open a conversation
  /rename <title>      rename the open conversation
  /delete              delete the open conversation
  /clear               start a fresh context
  /edit <id> <text>    edit one of your messages
  /regen <id>          regenerate an assistant reply
  /rm <id>             delete a message
  /model [id]          show or select the model
  /models              list available models
  /list                reload the conversation list
  /quit                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New(String),
    Switch(ConversationId),
    Rename(String),
    Delete,
    Clear,
    Edit(MessageId, String),
    Regenerate(MessageId),
    Remove(MessageId),
    Model(Option<String>),
    Models,
    List,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> ParseResult<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "new" => Self::New(argument.to_string()),
            "switch" => Self::Switch(parse_id(argument)?),
            "rename" => Self::Rename(argument.to_string()),
            "delete" => Self::Delete,
            "clear" => Self::Clear,
            "edit" => {
                let (id, text) = argument.split_once(char::is_whitespace).context(
                    MissingArgumentSnafu {
                        usage: "/edit <id> <text>",
                    },
                )?;
                Self::Edit(parse_id(id)?, text.trim().to_string())
            }
            "regen" => Self::Regenerate(parse_id(argument)?),
            "rm" => Self::Remove(parse_id(argument)?),
            "model" if argument.is_empty() => Self::Model(None),
            "model" => Self::Model(Some(argument.to_string())),
            "models" => Self::Models,
            "list" => Self::List,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return UnknownCommandSnafu { name: other }.fail(),
        };
        Ok(Some(command))
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> ParseResult<T> {
    raw.parse().ok().context(InvalidIdSnafu { raw })
}

/// Input lines the driver cannot turn into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseCommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { name: String },
    #[snafu(display("`{raw}` is not a valid id"))]
    InvalidId { raw: String },
    #[snafu(display("usage: {usage}"))]
    MissingArgument { usage: &'static str },
}

pub type ParseResult<T> = Result<T, ParseCommandError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DriverError {
    #[snafu(display("failed to start gateway on `{stage}`: {source}"))]
    StartGateway {
        stage: &'static str,
        source: GatewayError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type DriverResult<T> = Result<T, DriverError>;

pub async fn run(settings_store: SettingsStore) -> DriverResult<()> {
    let settings = settings_store.settings();
    let gateway = create_gateway(&settings.server_url).context(StartGatewaySnafu {
        stage: "create-gateway",
    })?;
    let coordinator = ChatCoordinator::new(Arc::new(gateway), &settings);

    report(coordinator.bootstrap().await);
    print_view(&coordinator).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-stdin-line",
    })? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("! {error}");
                continue;
            }
        };

        if !execute(&coordinator, &settings_store, command).await {
            break;
        }
        print_view(&coordinator).await?;
        coordinator.acknowledge_send();
    }

    Ok(())
}

/// Returns false when the loop should stop.
async fn execute(
    coordinator: &ChatCoordinator,
    settings_store: &SettingsStore,
    command: Command,
) -> bool {
    let active_id = coordinator.snapshot().active_id;
    match command {
        Command::Send(text) => match coordinator.send_message(&text).await {
            SendOutcome::Ignored => println!("! nothing sent"),
            SendOutcome::Delivered { .. } | SendOutcome::Failed { .. } => {}
        },
        Command::New(title) => report(coordinator.create_conversation(&title, true).await),
        Command::Switch(conversation_id) => {
            report(coordinator.switch_conversation(conversation_id).await)
        }
        Command::Rename(title) => match active_id {
            Some(conversation_id) => {
                report(coordinator.rename_conversation(conversation_id, &title).await)
            }
            None => println!("! no open conversation"),
        },
        Command::Delete => match active_id {
            Some(conversation_id) => report(coordinator.delete_conversation(conversation_id).await),
            None => println!("! no open conversation"),
        },
        Command::Clear => report(coordinator.clear_context().await),
        Command::Edit(message_id, text) => {
            report(coordinator.edit_message(message_id, &text).await)
        }
        Command::Regenerate(message_id) => {
            report(coordinator.regenerate_message(message_id).await)
        }
        Command::Remove(message_id) => report(coordinator.delete_message(message_id).await),
        Command::Model(None) => println!("model: {}", coordinator.snapshot().selected_model),
        Command::Model(Some(model_id)) => {
            let outcome = coordinator.select_model(&model_id);
            if outcome.is_applied() {
                let mut settings = (*settings_store.settings()).clone();
                settings.default_model = coordinator.snapshot().selected_model;
                if let Err(error) = settings_store.update(settings) {
                    tracing::warn!("failed to remember selected model: {error}");
                }
            }
            report(outcome);
        }
        Command::Models => {
            let catalog = coordinator.available_models().await;
            if let Some(warning) = &catalog.warning {
                println!("! {warning}");
            }
            for model in &catalog.models {
                println!("  {} ({})", model.id, model.name);
            }
        }
        Command::List => {
            if !coordinator.refresh_conversations().await {
                println!("! could not refresh the conversation list");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

fn report(outcome: MutationOutcome) {
    match outcome {
        MutationOutcome::Applied | MutationOutcome::Unchanged => {}
        MutationOutcome::Superseded => println!("(done, but you have moved on)"),
        MutationOutcome::Rejected { notice, revert_to } => {
            println!("! {}", notice.message);
            if let Some(Revert::Title { title, .. }) = revert_to {
                println!("  title stays `{title}`");
            }
        }
    }
}

async fn print_view(coordinator: &ChatCoordinator) -> DriverResult<()> {
    let rendered = coordinator.snapshot().to_string();
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(rendered.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "write-snapshot",
        })?;
    stdout.flush().await.context(WriteOutputSnafu {
        stage: "flush-stdout",
    })
}
