//! Command-line interface for Conrad relay cards.
//!
//! Parses the subcommand and link options, hands one command to the
//! dispatcher, prints the result, and exits with a code specific to the
//! kind of failure.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ctc_relay::config::{self, LinkConfig};
use ctc_relay::tracing::{self, prelude::*, Verbosity};
use ctc_relay::transport::{serial::SerialTransport, sim::SimulatedChain};
use ctc_relay::{AddressSpec, Command, CommandResult, Dispatcher, Error, RelayIndex, Transport};

/// Conrad Technology Centrum relay card
#[derive(Parser, Debug)]
#[command(name = "ctc-relay", version)]
struct Args {
    /// Serial device of relay card
    #[arg(short, long, value_name = "TTY", env = "TTY", required_unless_present = "simulate")]
    tty: Option<String>,

    /// Device address (default: broadcast to the only card); not valid with init
    #[arg(short, long, value_name = "ADDR")]
    address: Option<u8>,

    /// Read timeout in seconds (float allowed)
    #[arg(short = 'T', long, value_name = "SECONDS", value_parser = config::parse_timeout)]
    timeout: Option<Duration>,

    /// Print every frame sent and received
    #[arg(short, long)]
    debug: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Talk to N simulated cards instead of a serial device
    #[arg(long, value_name = "N")]
    simulate: Option<usize>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Initialize relay card chain
    #[command(visible_alias = "i")]
    Init,

    /// Set single relay
    #[command(visible_alias = "s")]
    Set {
        /// Relay number
        #[arg(value_name = "1-8", value_parser = clap::value_parser!(u8).range(1..=8))]
        relay: u8,
    },

    /// Clear single relay
    #[command(visible_alias = "c")]
    Clear {
        /// Relay number
        #[arg(value_name = "1-8", value_parser = clap::value_parser!(u8).range(1..=8))]
        relay: u8,
    },

    /// Toggle single relay
    #[command(visible_alias = "t")]
    Toggle {
        /// Relay number
        #[arg(value_name = "1-8", value_parser = clap::value_parser!(u8).range(1..=8))]
        relay: u8,
    },

    /// Get or set all relays of the port
    #[command(visible_alias = "p")]
    Port {
        /// Relay positions to set (ORed together)
        #[arg(short, long, value_name = "0-255", value_parser = parse_int)]
        set: Option<u32>,
    },
}

impl Cmd {
    fn to_command(&self) -> Command {
        // Relays are numbered from 1 on the command line.
        match *self {
            Cmd::Init => Command::InitChain,
            Cmd::Set { relay } => Command::SetRelay(relay.saturating_sub(1)),
            Cmd::Clear { relay } => Command::ClearRelay(relay.saturating_sub(1)),
            Cmd::Toggle { relay } => Command::ToggleRelay(relay.saturating_sub(1)),
            Cmd::Port { set: Some(value) } => Command::WritePort(value),
            Cmd::Port { set: None } => Command::ReadPort,
        }
    }
}

/// Parse an integer with an optional `0x`, `0o` or `0b` prefix.
fn parse_int(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = match s.get(..2) {
        Some("0x") | Some("0X") => (&s[2..], 16),
        Some("0o") | Some("0O") => (&s[2..], 8),
        Some("0b") | Some("0B") => (&s[2..], 2),
        _ => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("'{}': {}", s, e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing::init(Verbosity {
        level: args.verbose,
        frames: args.debug,
    });

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("ctc-relay: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let command = args.command.to_command();
    let address = AddressSpec::from_option(args.address);
    let read_timeout = args.timeout.unwrap_or_else(config::read_timeout_from_env);

    let result = match args.simulate {
        Some(boards) => {
            info!(boards, "Using simulated chain");
            let mut chain = SimulatedChain::new(boards);
            execute_on(&mut chain, command, address, read_timeout).await?
        }
        None => {
            let tty = args
                .tty
                .context("no serial device given (use --tty or TTY)")?;
            let config = LinkConfig::new(tty).with_read_timeout(read_timeout);
            config.validate()?;
            let mut port = SerialTransport::open(&config)
                .with_context(|| format!("failed to open {}", config.tty))?;
            execute_on(&mut port, command, address, config.read_timeout).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn execute_on<T: Transport>(
    transport: &mut T,
    command: Command,
    address: AddressSpec,
    read_timeout: Duration,
) -> ctc_relay::Result<CommandResult> {
    let result = Dispatcher::new(transport, read_timeout)
        .execute(command, address)
        .await;

    if let Err(e) = transport.close().await {
        warn!(error = %e, "Failed to close transport");
    }
    result
}

fn print_result(result: &CommandResult) {
    match result {
        CommandResult::Port { bank, .. } => {
            println!("Port   : {}", bank);
            for relay in RelayIndex::all() {
                println!(
                    "Relay {}: {}",
                    relay.value() + 1,
                    if bank.is_on(relay) { "On" } else { "Off" }
                );
            }
        }
        CommandResult::Chain { boards } => {
            for board in boards.boards() {
                println!(
                    "Controller {}: Firmware version {}",
                    board.address, board.firmware
                );
            }
        }
    }
}

fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<Error>() {
        Some(Error::InvalidArgument(_)) => 2,
        Some(Error::Transport(_)) => 3,
        Some(Error::MalformedResponse(_)) => 4,
        Some(Error::Rejected { .. }) => 5,
        Some(Error::NoBoardFound) => 6,
        Some(Error::ChainOverflow { .. }) => 7,
        Some(Error::Encoding(_)) => 70,
        None => 1,
    }
}
