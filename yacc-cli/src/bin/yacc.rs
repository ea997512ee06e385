//! Run one configuration command against a CANopen node
use std::{error::Error, io::Write as _, path::Path, process::ExitCode};

use clap::Parser;
use yacc_cli::{
    command::{Cli, Commands},
    report::{format_guard, format_progress, format_read},
};
use yacc_client::{
    common::{
        traits::ObjectDictionarySource, ObjectDictionary, SocketCanReceiver, SocketCanSender,
    },
    CanConnection, Session, SessionConfig, SocketCanTransport, SyncError, SyncProgress,
};
use yacc_eds::EdsSource;

type BusSession = Session<CanConnection<SocketCanSender, SocketCanReceiver>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.bus.session_config()?;
    let source = EdsSource::new(config.node.id);

    match cli.command {
        Commands::Groups => {
            let dictionary = load_configured(&source, &config)?;
            for name in dictionary.group_names() {
                let index = dictionary.index_of(name)?;
                println!("{index:04X} {name}");
            }
        }
        Commands::Entries(args) => {
            let dictionary = load_configured(&source, &config)?;
            for name in dictionary.subentry_names(&args.group)? {
                let sub = dictionary.subindex_of(&args.group, name)?;
                let data_type = dictionary.data_type_of(&args.group, name)?;
                println!("{sub:3} {name} ({data_type:?})");
            }
        }
        Commands::Read(args) => {
            let mut session = connect(&source, &config)?;
            let data = session.read_one(args.index, args.sub)?;
            let dictionary = session.dictionary();
            print!(
                "{}",
                format_read(
                    args.index,
                    args.sub,
                    dictionary.group_of(args.index),
                    dictionary
                        .entry(args.index, args.sub)
                        .map(|e| e.data_type),
                    &data,
                )
            );
            session.disconnect();
        }
        Commands::Write(args) => {
            let mut session = connect(&source, &config)?;
            let data_type = session
                .dictionary()
                .entry(args.index, args.sub)
                .map(|e| e.data_type);
            let raw = args.encode(data_type)?;
            let state = session.write_one(args.index, args.sub, &raw)?;
            if let Some(message) = format_guard(state) {
                println!("{message}");
            }
            println!("Success!");
            session.disconnect();
        }
        Commands::Upload(args) => {
            let mut session = connect(&source, &config)?;
            if session.dictionary().is_empty() {
                return Err("Upload needs an object dictionary, pass --od".into());
            }
            show_progress("Uploading", session.upload())?;
            source.export(session.dictionary(), &args.file)?;
            println!("Wrote {}", args.file.display());
            session.disconnect();
        }
        Commands::Download(args) => {
            let dcf = source.load(&args.file)?;
            let mut session = connect(&source, &config)?;
            show_progress("Downloading", session.download(&dcf))?;
            if args.save {
                session.save()?;
                println!("Saved");
            }
            session.disconnect();
        }
        Commands::Save => {
            let mut session = connect(&source, &config)?;
            session.save()?;
            println!("Success!");
            session.disconnect();
        }
        Commands::RestoreDefaults => {
            let mut session = connect(&source, &config)?;
            session.restore_defaults()?;
            println!("Success! Defaults apply after the node is reset");
            session.disconnect();
        }
    }
    Ok(())
}

fn connect(source: &EdsSource, config: &SessionConfig) -> Result<BusSession, Box<dyn Error>> {
    Ok(Session::connect(&SocketCanTransport, source, config)?)
}

fn load_configured(
    source: &EdsSource,
    config: &SessionConfig,
) -> Result<ObjectDictionary, Box<dyn Error>> {
    let path: &Path = config
        .node
        .object_dictionary
        .as_deref()
        .ok_or("No object dictionary configured, pass --od")?;
    Ok(source.load(path)?)
}

/// Drive a bulk transfer to completion, rewriting one progress line per entry
fn show_progress<I>(verb: &str, transfer: I) -> Result<(), SyncError>
where
    I: Iterator<Item = Result<SyncProgress, SyncError>>,
{
    let mut stdout = std::io::stdout();
    let mut last = None;
    for tick in transfer {
        let progress = match tick {
            Ok(progress) => progress,
            Err(e) => {
                println!();
                return Err(e);
            }
        };
        print!("\r{}", format_progress(verb, progress));
        stdout.flush().ok();
        last = Some(progress);
    }
    match last {
        Some(_) => println!(),
        None => println!("Nothing to transfer"),
    }
    Ok(())
}
