use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use daqrepl::{
    Channel, ChannelConfig, ChannelError, DAQREPL_VERSION, RestClient, RestConfig, load_commands,
    run_commands,
};

const DEFAULT_WAIT_SECS: f64 = 0.1;

#[derive(Debug, PartialEq)]
struct Args {
    commands: PathBuf,
    wait: Option<Duration>,
    app: Option<PathBuf>,
    rest: Option<String>,
    answer_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let args = match parse_args(&argv) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: daqrepl <commands.json> [--wait SECS] [--app PROGRAM]");
            eprintln!("       daqrepl <commands.json> --rest URL [--answer-port PORT]");
            eprintln!();
            eprintln!("Arguments:");
            eprintln!("  <commands.json>      JSON array of command objects, sent in order");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --wait <secs>        Output budget after each command [default: 0.1]");
            eprintln!("  --app <program>      Worker executable [default: $DAQ_APPLICATION or daq_application]");
            eprintln!("  --rest <url>         POST commands to a running application instead");
            eprintln!("  --answer-port <n>    Reply port announced to the application [default: 12333]");
            process::exit(2);
        }
    };

    daqrepl::logging::init_tracing();
    tracing::info!("daqrepl {}", DAQREPL_VERSION);

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut commands: Option<PathBuf> = None;
    let mut wait = Some(Duration::from_secs_f64(DEFAULT_WAIT_SECS));
    let mut app = None;
    let mut rest = None;
    let mut answer_port = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--wait" => {
                i += 1;
                let value = args.get(i).ok_or("--wait requires a value")?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| format!("invalid --wait value '{value}'"))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(format!("invalid --wait value '{value}'"));
                }
                wait = (secs > 0.0).then(|| Duration::from_secs_f64(secs));
            }
            "--app" => {
                i += 1;
                app = Some(PathBuf::from(args.get(i).ok_or("--app requires a value")?));
            }
            "--rest" => {
                i += 1;
                rest = Some(args.get(i).ok_or("--rest requires a value")?.clone());
            }
            "--answer-port" => {
                i += 1;
                let value = args.get(i).ok_or("--answer-port requires a value")?;
                answer_port = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid --answer-port value '{value}'"))?,
                );
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if commands.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                commands = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    let commands = commands.ok_or("missing required argument: <commands.json>")?;
    if rest.is_some() && app.is_some() {
        return Err("--app and --rest are mutually exclusive".to_string());
    }
    Ok(Args {
        commands,
        wait,
        app,
        rest,
        answer_port,
    })
}

fn print_reply(_index: usize, reply: &str) {
    if !reply.is_empty() {
        print!("{reply}");
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let commands = load_commands(&args.commands)?;

    if let Some(url) = args.rest {
        let mut config = RestConfig::new(url);
        if let Some(port) = args.answer_port {
            config = config.with_answer_port(port);
        }
        let mut client = RestClient::new(config)?;
        tracing::info!(url = %client.url(), num_commands = commands.len(), "Posting command stream");
        run_commands(&mut client, &commands, args.wait, print_reply).await?;
        return Ok(());
    }

    let config = match args.app {
        Some(program) => ChannelConfig::new(program),
        None => ChannelConfig::default(),
    };
    let mut channel = Channel::spawn(config).await?;
    tracing::info!(
        fifo = %channel.transport_path().display(),
        num_commands = commands.len(),
        "Sending command stream"
    );

    let result = run_commands(&mut channel, &commands, args.wait, print_reply).await;
    settle(result, channel.cleanup())
}

/// A failed command outranks a failed cleanup, which is then only logged.
fn settle(result: Result<(), ChannelError>, cleanup: io::Result<()>) -> anyhow::Result<()> {
    match (result, cleanup) {
        (Err(e), Err(cleanup_err)) => {
            tracing::warn!(error = %cleanup_err, "Failed to remove transport directory");
            Err(e.into())
        }
        (Err(e), Ok(())) => Err(e.into()),
        (Ok(()), Err(cleanup_err)) => Err(ChannelError::Cleanup(cleanup_err).into()),
        (Ok(()), Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("daqrepl")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults() {
        let args = parse_args(&argv(&["job.json"])).unwrap();
        assert_eq!(
            args,
            Args {
                commands: PathBuf::from("job.json"),
                wait: Some(Duration::from_millis(100)),
                app: None,
                rest: None,
                answer_port: None,
            }
        );
    }

    #[test]
    fn zero_wait_is_fire_and_forget() {
        let args = parse_args(&argv(&["job.json", "--wait", "0"])).unwrap();
        assert_eq!(args.wait, None);
    }

    #[test]
    fn rest_options() {
        let args = parse_args(&argv(&[
            "--rest",
            "http://daq:12345/command",
            "--answer-port",
            "4000",
            "job.json",
        ]))
        .unwrap();
        assert_eq!(args.rest.as_deref(), Some("http://daq:12345/command"));
        assert_eq!(args.answer_port, Some(4000));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&argv(&[])).is_err());
        assert!(parse_args(&argv(&["a.json", "b.json"])).is_err());
        assert!(parse_args(&argv(&["job.json", "--wait", "-1"])).is_err());
        assert!(parse_args(&argv(&["job.json", "--wait"])).is_err());
        assert!(parse_args(&argv(&["job.json", "--bogus"])).is_err());
        assert!(parse_args(&argv(&["job.json", "--app", "x", "--rest", "http://y"])).is_err());
        assert_eq!(parse_args(&argv(&["--help"])), Err(String::new()));
    }

    #[test]
    fn command_failure_outranks_cleanup_failure() {
        let err = settle(
            Err(ChannelError::ProcessGone),
            Err(io::Error::other("directory busy")),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChannelError>(),
            Some(ChannelError::ProcessGone)
        ));

        let err = settle(Ok(()), Err(io::Error::other("directory busy"))).unwrap_err();
        assert!(err.to_string().contains("directory busy"));

        assert!(settle(Ok(()), Ok(())).is_ok());
    }
}
