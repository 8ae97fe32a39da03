use clap::Parser;
use dmxp_netcopy::Core::shutdown::{arm_alarm, disarm_alarm};
use dmxp_netcopy::Transport::Strategy::Strategy;
use dmxp_netcopy::Transport::ReceiverBuilder;
use dmxp_netcopy::Shutdown;
use std::net::IpAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Open several connections to a sender and measure what arrives.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Sender address.
    #[arg(short = 'i', long = "ip", default_value = "127.0.0.1")]
    peer: IpAddr,
    /// Sender port.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    /// Number of receiving connections, one thread each.
    #[arg(short, long, default_value_t = 4)]
    threads: usize,
    /// Total message size in bytes; must match the sender.
    #[arg(short = 's', long = "size", default_value_t = 1024)]
    message_size: usize,
    /// Seconds to receive for.
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
    /// Receive strategy.
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = Strategy::Naive)]
    strategy: Strategy,
    /// Check every received message against the fill pattern.
    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "receiver failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> dmxp_netcopy::Result<()> {
    let duration = Duration::from_secs(args.duration);

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers()?;

    let receiver = ReceiverBuilder::new()
        .with_peer_ip(args.peer)
        .with_port(args.port)
        .with_threads(args.threads)
        .with_message_size(args.message_size)
        .with_duration(duration)
        .with_strategy(args.strategy)
        .with_verify(args.verify)
        .build()?
        .with_shutdown(shutdown);

    arm_alarm(receiver.config().alarm_after())?;
    let report = receiver.run();
    disarm_alarm();
    let report = report?;

    let totals = &report.totals;
    println!(
        "Received {} bytes in {} messages on {}/{} connection(s)",
        totals.total_bytes, totals.total_messages, report.connected, args.threads
    );
    println!(
        "Elapsed {:.2} s, throughput {:.4} Gbps, average latency {:.2} us",
        totals.elapsed.as_secs_f64(),
        totals.throughput_gbps(),
        totals.average_latency_us()
    );
    if args.verify {
        println!("Verification failures: {}", totals.verify_failures);
    }
    println!("{}", report.result_line());
    Ok(())
}
