// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

use clap::{error::ErrorKind, ArgAction, Args, CommandFactory, Parser, Subcommand};
use probe_rs::Permissions;
use sscg::{
    gate, ControlRegister, Endpoint, MemoryRegister, PllName, ProbeRegister, Sscg, SscgConfig,
    IMX8MP,
};
use tracing_subscriber::EnvFilter;

/// Tune spread-spectrum modulation on i.MX 8M Plus PLLs
#[derive(Parser)]
#[command(version, about, long_about)]
struct Cli {
    /// Log more; repeat for even more. RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the PLLs that support modulation and their rates, then exit.
    List,
    /// Compute the register writes without touching hardware.
    Compute {
        #[command(flatten)]
        modulation: Modulation,

        /// The PLL's output rate (Hz)
        #[arg(long)]
        rate: u64,

        /// Endpoint writes to apply after bring-up, like `enable=0`
        #[arg(value_parser = parse_write)]
        writes: Vec<EndpointWrite>,
    },
    /// Bring up and tune modulation through a debug probe.
    Tune {
        #[command(flatten)]
        modulation: Modulation,

        /// The probe-rs chip name
        #[arg(long, default_value = "MIMX8ML8")]
        chip: String,

        /// The PLL's output rate (Hz)
        ///
        /// If omitted, compute it from the PLL's divider registers.
        #[arg(long)]
        rate: Option<u64>,

        /// Endpoint writes to apply after bring-up, like `enable=0`
        ///
        /// Writes apply in order. Endpoints are mf, mr, pf, and enable;
        /// the debugfs names also work.
        #[arg(value_parser = parse_write)]
        writes: Vec<EndpointWrite>,
    },
    /// Show whether the shared CCM gates are on.
    Gates {
        /// The probe-rs chip name
        #[arg(long, default_value = "MIMX8ML8")]
        chip: String,
    },
}

/// Initial modulation parameters
#[derive(Args)]
struct Modulation {
    /// The PLL to modulate. This is case insensitive.
    pll: String,

    /// Modulation frequency (Hz)
    #[arg(long)]
    mf: u32,

    /// Modulation rate (percent, times 100)
    #[arg(long)]
    mr: u32,

    /// Modulation profile: 0 (down), 1 (up), or 2 (center)
    #[arg(long, default_value = "0")]
    pf: u32,
}

impl Modulation {
    fn pll_name(&self) -> PllName<'static> {
        match IMX8MP.lookup_pll(&self.pll) {
            Some(name) => name,
            None => fail(
                ErrorKind::InvalidValue,
                format!("PLL named '{}' can't modulate.", self.pll),
            ),
        }
    }

    fn config(&self) -> SscgConfig {
        SscgConfig::new(self.mf, self.mr, self.pf)
            .unwrap_or_else(|err| fail(ErrorKind::InvalidValue, err.to_string()))
    }
}

#[derive(Clone)]
struct EndpointWrite {
    endpoint: Endpoint,
    value: String,
}

fn parse_write(arg: &str) -> Result<EndpointWrite, String> {
    let (endpoint, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ENDPOINT=VALUE, found '{arg}'"))?;
    let endpoint = endpoint
        .parse::<Endpoint>()
        .map_err(|err: sscg::Error| err.to_string())?;
    Ok(EndpointWrite {
        endpoint,
        value: value.into(),
    })
}

fn fail(kind: ErrorKind, message: impl std::fmt::Display) -> ! {
    Cli::command().error(kind, message).exit()
}

/// Hardware failures are I/O errors; everything else is a bad value.
fn error_kind(err: &sscg::Error) -> ErrorKind {
    match err {
        sscg::Error::Io { .. } => ErrorKind::Io,
        _ => ErrorKind::InvalidValue,
    }
}

fn attach(chip: &str) -> probe_rs::Session {
    match probe_rs::Session::auto_attach(chip, Permissions::default()) {
        Ok(session) => session,
        Err(err) => fail(
            ErrorKind::Io,
            format!("{err} {err:?}\nIs your SoC connected to your debugger?"),
        ),
    }
}

fn apply<R: ControlRegister>(sscg: &Sscg<R>, writes: &[EndpointWrite]) {
    for write in writes {
        tracing::info!(endpoint = %write.endpoint, value = %write.value, "endpoint write");
        if let Err(err) = sscg.write_endpoint(write.endpoint, &write.value) {
            fail(
                error_kind(&err),
                format!("writing '{}' to {}: {err}", write.value, write.endpoint),
            );
        }
    }
}

fn print_session<R: ControlRegister>(sscg: &Sscg<R>) {
    println!("{:>18} | {:>10}", "Endpoint", "Value");
    println!("{}", "-".repeat(18 + 3 + 10));
    for endpoint in Endpoint::ALL {
        println!(
            "{:>18} | {:>10}",
            endpoint.long_name(),
            sscg.read_endpoint(endpoint).trim_end()
        );
    }
    let state = sscg.state();
    println!("{:>18} | {:>10}", "mfr", state.mfr);
    println!("{:>18} | {:>10}", "mrr", state.mrr);
    println!("{:>18} | {:>#10x}", "SSCG_CTRL", state.control_word());
}

fn list() {
    for name in IMX8MP.all_pll_names() {
        println!("{name}");
        for entry in IMX8MP.get(name).rates() {
            println!(
                "  {:>12} Hz  m={:<4} p={:<2} s={:<2} k={}",
                entry.rate, entry.mdiv, entry.pdiv, entry.sdiv, entry.kdiv
            );
        }
    }
}

fn compute(modulation: &Modulation, rate: u64, writes: &[EndpointWrite]) {
    let name = modulation.pll_name();
    let pll = IMX8MP.get(name);

    let sscg = Sscg::bring_up(modulation.config(), pll.rates(), rate, MemoryRegister::default())
        .unwrap_or_else(|err| fail(ErrorKind::InvalidValue, err));
    apply(&sscg, writes);
    print_session(&sscg);

    println!();
    println!("Writes to {:#010x}:", IMX8MP.sscg_ctrl(name));
    for value in sscg.into_register().writes() {
        println!("  {value:#010x}");
    }
}

fn tune(modulation: &Modulation, chip: &str, rate: Option<u64>, writes: &[EndpointWrite]) {
    let name = modulation.pll_name();
    let config = modulation.config();

    let mut session = attach(chip);
    let mut core = session
        .core(0)
        .unwrap_or_else(|err| fail(ErrorKind::Io, err));

    let rate = match rate {
        Some(rate) => rate,
        None => match IMX8MP.read_rate(name, &mut core) {
            Ok(Some(rate)) => rate,
            Ok(None) => fail(
                ErrorKind::Io,
                format!("{name} isn't programmed; pass --rate to continue."),
            ),
            Err(err) => fail(ErrorKind::Io, err),
        },
    };
    tracing::info!(pll = %name, rate, "PLL rate");

    let register = IMX8MP.sscg_register(name, &mut core);
    let sscg = match Sscg::bring_up(config, IMX8MP.get(name).rates(), rate, register) {
        Ok(sscg) => sscg,
        Err(err) => {
            tracing::error!(pll = %name, "sscg unavailable: {err}");
            fail(error_kind(&err), format!("{name}: {err}"))
        }
    };

    apply(&sscg, writes);
    print_session(&sscg);
}

fn gates(chip: &str) {
    let mut session = attach(chip);
    let mut core = session
        .core(0)
        .unwrap_or_else(|err| fail(ErrorKind::Io, err));

    println!("{:>8} | {:>12} | {:>5} | Leaves", "Gate", "CCGR", "State");
    println!("{}", "-".repeat(8 + 12 + 5 + 3 * 3 + 6));
    for shared in gate::SHARED_GATES {
        let address = IMX8MP.ccm_register(shared.ccgr_offset);
        let register = ProbeRegister::new(&mut core, address);
        let ccgr = gate::SharedGate::new(shared.field(), register);
        let state = match ccgr.is_on() {
            Ok(true) => "on",
            Ok(false) => "off",
            Err(err) => fail(error_kind(&err), format!("{}: {err}", shared.name)),
        };
        println!(
            "{:>8} | {:>#12x} | {:>5} | {}",
            shared.name,
            address,
            state,
            shared.leaves.join(", ")
        );
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::List => list(),
        Command::Compute {
            modulation,
            rate,
            writes,
        } => compute(modulation, *rate, writes),
        Command::Tune {
            modulation,
            chip,
            rate,
            writes,
        } => tune(modulation, chip, *rate, writes),
        Command::Gates { chip } => gates(chip),
    }
}
