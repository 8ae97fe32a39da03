use clap::Parser;
use dmxp_netcopy::Core::shutdown::{arm_alarm, disarm_alarm};
use dmxp_netcopy::Transport::Strategy::{Strategy, ZeroCopyProbe};
use dmxp_netcopy::Transport::SenderBuilder;
use dmxp_netcopy::Shutdown;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Accept receivers and stream fixed-size messages to each of them.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    /// Total message size in bytes, split over 8 fields.
    #[arg(short = 's', long = "size", default_value_t = 1024)]
    message_size: usize,
    /// Seconds each connection transmits for.
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
    /// Transmission strategy.
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = Strategy::Naive)]
    strategy: Strategy,
    /// Maximum number of concurrent connections.
    #[arg(short = 'c', long = "max-connections", default_value_t = 100)]
    max_connections: usize,
    /// Skip the SO_ZEROCOPY probe and always use regular sendmsg().
    #[arg(long)]
    no_zerocopy: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sender failed to start");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> dmxp_netcopy::Result<()> {
    let duration = Duration::from_secs(args.duration);
    let probe = if args.no_zerocopy {
        ZeroCopyProbe::ForceUnavailable
    } else {
        ZeroCopyProbe::Kernel
    };

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers()?;

    let sender = SenderBuilder::new()
        .with_port(args.port)
        .with_message_size(args.message_size)
        .with_duration(duration)
        .with_strategy(args.strategy)
        .with_max_connections(args.max_connections)
        .with_zero_copy_probe(probe)
        .build()?
        .with_shutdown(shutdown);

    arm_alarm(sender.config().alarm_after())?;
    let report = sender.run();
    disarm_alarm();

    let totals = &report.totals;
    println!(
        "Sent {} bytes in {} messages over {} connection(s), {} rejected",
        totals.total_bytes, totals.total_messages, report.registry.admitted, report.registry.rejected
    );
    println!(
        "Elapsed {:.2} s, throughput {:.4} Gbps",
        totals.elapsed.as_secs_f64(),
        totals.throughput_gbps()
    );
    if args.strategy == Strategy::ZeroCopy {
        println!(
            "Zero-copy sends {}, fallback sends {}, completions {}",
            totals.zerocopy_sends, totals.fallback_sends, totals.completions
        );
    }
    Ok(())
}
