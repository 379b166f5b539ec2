//! userwall - user-level firewall simulator
//!
//! # Usage
//!
//! ```bash
//! # Manage rules
//! userwall rules add r1 process_name spotify block
//! userwall rules list
//!
//! # Evaluate the demo snapshot (dry-run)
//! userwall scan --demo
//!
//! # Inspect the audit log
//! userwall logs --rule r1 --limit 20
//! ```

use std::env;
use std::path::Path;

use userwall::{
    audit::{AuditFilter, AuditLog},
    config::{Config, SafetyMode},
    engine::{Enforcer, NoopControl, Pipeline, ProcessControl, SignalControl},
    error::{FirewallError, Result},
    logging,
    monitor::Sampler,
    rules::{Action, Rule, RuleKind, RuleStore},
    snapshot::{self, DemoSnapshot, JsonSnapshot, SnapshotProvider, SystemSnapshot},
    Outcome,
};

/// Print version information
fn print_version() {
    println!("userwall {}", env!("CARGO_PKG_VERSION"));
}

/// Print help message
fn print_help() {
    println!(
        r#"userwall - user-level firewall simulator

USAGE:
    userwall [OPTIONS] <COMMAND>

COMMANDS:
    rules list                              List rules in matching order
    rules add <id> <type> <value> <action>  Add a rule
    rules delete <id>                       Delete a rule
    scan                                    Evaluate one snapshot against the rules
    logs                                    Show audit log records
    port <port>                             Show which processes own a local port
    connections                             List listening and established sockets
    monitor                                 Sample system load in the background

OPTIONS:
    -h, --help              Print this help message
    -v, --version           Print version information
    -c, --config PATH       Path to config file
        --verbose           Debug diagnostics on stderr
        --demo              Use the built-in demo snapshot
        --snapshot PATH     Use a JSON snapshot file
        --live              Disable dry-run for this invocation (real actions)
        --pid N             logs: filter by pid
        --rule ID           logs: filter by rule id
        --action A          logs: filter by action
        --limit N           logs: last N records (default 10); connections: rows per table (default 25)
        --all               logs: include rotated archives
        --samples N         monitor: number of samples to print (default 5)

RULE TYPES:   process_name, username, port, ip
ACTIONS:      allow, block, terminate

ENVIRONMENT:
    USERWALL_LOG            tracing filter, e.g. userwall=debug
"#
    );
}

/// Parse command line arguments
#[derive(Default)]
struct Args {
    help: bool,
    version: bool,
    verbose: bool,
    config_path: Option<String>,
    demo: bool,
    snapshot: Option<String>,
    live: bool,
    pid: Option<u32>,
    rule: Option<String>,
    action: Option<String>,
    limit: Option<usize>,
    all: bool,
    samples: Option<usize>,
    positional: Vec<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut result = Args::default();

        let mut i = 1;
        while i < args.len() {
            let arg = args[i].as_str();
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
                _ => (arg, None),
            };

            let mut value = || -> Result<String> {
                if let Some(ref v) = inline {
                    return Ok(v.clone());
                }
                i += 1;
                args.get(i)
                    .cloned()
                    .ok_or_else(|| FirewallError::usage(format!("{} needs a value", flag)))
            };

            match flag {
                "-h" | "--help" => result.help = true,
                "-v" | "--version" => result.version = true,
                "--verbose" => result.verbose = true,
                "--demo" => result.demo = true,
                "--live" => result.live = true,
                "--all" => result.all = true,
                "-c" | "--config" => result.config_path = Some(value()?),
                "--snapshot" => result.snapshot = Some(value()?),
                "--rule" => result.rule = Some(value()?),
                "--action" => result.action = Some(value()?),
                "--pid" => result.pid = Some(parse_number(flag, &value()?)?),
                "--limit" => result.limit = Some(parse_number(flag, &value()?)?),
                "--samples" => result.samples = Some(parse_number(flag, &value()?)?),
                other if other.starts_with('-') && other.len() > 1 => {
                    return Err(FirewallError::usage(format!("unknown option {}", other)));
                }
                _ => result.positional.push(arg.to_string()),
            }
            i += 1;
        }

        Ok(result)
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| FirewallError::usage(format!("{} expects a number, got '{}'", flag, raw)))
}

fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    // Handle help and version
    if args.help || (args.positional.is_empty() && !args.version) {
        print_help();
        return;
    }

    if args.version {
        print_version();
        return;
    }

    logging::init(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    // Load configuration
    let config = match args.config_path {
        Some(ref path) => Config::load_from(Path::new(path))?,
        None => Config::load(),
    };

    let command: Vec<&str> = args.positional.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["rules", rest @ ..] => rules_command(&config, rest),
        ["scan"] => scan_command(&config, args),
        ["logs"] => logs_command(&config, args),
        ["port", port] => port_command(args, parse_number("port", port)?),
        ["connections"] => connections_command(args),
        ["monitor"] => monitor_command(&config, args),
        _ => Err(FirewallError::usage(format!(
            "unknown command '{}', see --help",
            command.join(" ")
        ))),
    }
}

fn rules_command(config: &Config, rest: &[&str]) -> Result<()> {
    let mut store = RuleStore::open(config.rules_path())?;

    match rest {
        [] | ["list"] => {
            if store.is_empty() {
                println!("No rules currently defined.");
                return Ok(());
            }
            println!("Current Rules:");
            for rule in store.list() {
                println!("  * {}", rule);
            }
        }
        ["add", id, kind, value, action] => {
            let kind: RuleKind = kind.parse()?;
            let action: Action = action.parse()?;
            store.add(Rule::new(*id, kind, *value, action))?;
            println!("Rule {} added.", id);
        }
        ["delete", id] => {
            store.delete(id)?;
            println!("Rule {} deleted.", id);
        }
        _ => {
            return Err(FirewallError::usage(
                "usage: rules [list | add <id> <type> <value> <action> | delete <id>]",
            ))
        }
    }
    Ok(())
}

/// Pick the snapshot source. Real signals are only possible against the
/// live OS snapshot; demo and file pids are not real processes.
fn provider(args: &Args) -> (Box<dyn SnapshotProvider>, Box<dyn ProcessControl>) {
    if args.demo {
        (Box::new(DemoSnapshot::new()), Box::new(NoopControl))
    } else if let Some(ref path) = args.snapshot {
        (Box::new(JsonSnapshot::new(path)), Box::new(NoopControl))
    } else {
        (Box::new(SystemSnapshot::new()), Box::new(SignalControl::new()))
    }
}

fn scan_command(config: &Config, args: &Args) -> Result<()> {
    let mode = if args.live {
        SafetyMode::Live
    } else {
        config.safety_mode()
    };

    let store = RuleStore::open(config.rules_path())?;
    let audit = AuditLog::new(config.audit_settings());
    let (mut source, control) = provider(args);
    let pipeline = Pipeline::new(store.into_shared(), Enforcer::new(mode, control), audit);

    if !mode.is_dry_run() {
        eprintln!("Warning: live mode, matched terminate rules will signal real processes");
    }

    let summary = pipeline.run(source.as_mut())?;

    println!("--- Applying Rules ({}) ---", mode.as_str());
    for decision in &summary.decisions {
        println!("{} | {}", decision, decision.target());
    }
    println!(
        "\n{} processes, {} connections, {} decisions ({} simulated, {} applied, {} not carried out)",
        summary.processes,
        summary.connections,
        summary.matches,
        summary.count(Outcome::Simulated),
        summary.count(Outcome::Applied),
        summary.matches - summary.count(Outcome::Simulated) - summary.count(Outcome::Applied),
    );
    if summary.connections_unavailable {
        eprintln!(
            "Warning: this snapshot source cannot list connections; port and ip rules were not evaluated"
        );
    }
    if summary.audit_failures > 0 {
        eprintln!(
            "Warning: {} decisions could not be written to the audit log",
            summary.audit_failures
        );
    }
    Ok(())
}

fn logs_command(config: &Config, args: &Args) -> Result<()> {
    let audit = AuditLog::new(config.audit_settings());
    if !audit.is_enabled() {
        println!("Audit logging is disabled.");
        return Ok(());
    }

    let mut filter = AuditFilter::all();
    filter.pid = args.pid;
    filter.rule_id = args.rule.clone();
    filter.action = args.action.clone();
    let limit = args.limit.unwrap_or(10);

    let records = if filter == AuditFilter::all() && !args.all {
        audit.recent(limit)?
    } else {
        let mut records = if args.all {
            audit.query_all(&filter)?
        } else {
            audit.query(&filter)?
        };
        records.split_off(records.len().saturating_sub(limit))
    };

    println!("--- Recent Firewall Logs ---");
    if records.is_empty() {
        println!("No matching records.");
    }
    for record in records {
        println!("{}", record);
    }
    Ok(())
}

/// A source that cannot enumerate sockets would report every port as free
fn require_connections(source: &dyn SnapshotProvider) -> Result<()> {
    if source.lists_connections() {
        Ok(())
    } else {
        Err(FirewallError::usage(
            "connection listing is not available on this platform; use --demo or --snapshot",
        ))
    }
}

fn port_command(args: &Args, port: u16) -> Result<()> {
    let (mut source, _) = provider(args);
    require_connections(source.as_ref())?;
    let processes = source.processes()?;
    let connections = source.connections()?;

    let owners = snapshot::owners_of_port(&connections, port);
    if owners.is_empty() {
        println!("No process is currently using port {}.", port);
        return Ok(());
    }

    println!("Port {} is used by:", port);
    for conn in owners {
        let owner = conn
            .pid
            .and_then(|pid| processes.iter().find(|p| p.pid == pid));
        match owner {
            Some(p) => println!(
                "PID {:<6} -> {} (User: {}) | Status: {}",
                p.pid,
                p.name,
                p.username.as_deref().unwrap_or("N/A"),
                conn.status
            ),
            None => println!("{} -> [process not found]", conn),
        }
    }
    Ok(())
}

fn connections_command(args: &Args) -> Result<()> {
    let (mut source, _) = provider(args);
    require_connections(source.as_ref())?;
    let processes = source.processes()?;
    let connections = source.connections()?;
    let limit = args.limit.unwrap_or(25);

    if connections.is_empty() {
        println!("No connections found.");
        return Ok(());
    }

    let owner = |pid: Option<u32>| {
        pid.and_then(|pid| processes.iter().find(|p| p.pid == pid))
            .map_or("-", |p| p.name.as_str())
    };
    let pid_text = |pid: Option<u32>| pid.map_or_else(|| "-".to_string(), |p| p.to_string());

    let listening: Vec<_> = connections.iter().filter(|c| c.is_listening()).collect();
    let established: Vec<_> = connections.iter().filter(|c| c.is_established()).collect();

    if !listening.is_empty() {
        println!("--- Listening Ports ---");
        println!("{:<8}{:<25}{:<45}{:<12}", "PID", "Process", "Local Address", "Status");
        for conn in listening.iter().take(limit) {
            let local = conn.local.as_ref().map_or_else(|| "-".to_string(), |e| e.to_string());
            println!(
                "{:<8}{:<25}{:<45}{:<12}",
                pid_text(conn.pid),
                owner(conn.pid),
                local,
                conn.status
            );
        }
    }

    if !established.is_empty() {
        println!("\n--- Established Connections ---");
        println!("{:<8}{:<25}{:<70}", "PID", "Process", "Local <-> Remote");
        for conn in established.iter().take(limit) {
            println!(
                "{:<8}{:<25}{:<70}",
                pid_text(conn.pid),
                owner(conn.pid),
                conn.socket_pair()
            );
        }
    }

    println!(
        "\n{} listening, {} established, {} other",
        listening.len(),
        established.len(),
        connections.len() - listening.len() - established.len()
    );
    Ok(())
}

fn monitor_command(config: &Config, args: &Args) -> Result<()> {
    let samples = args.samples.unwrap_or(5);
    let interval = config.monitor.interval();
    let sampler = Sampler::start(interval, config.monitor.history);

    println!("{:<10} {:>8} {:>10} {:>10}", "Sample", "CPU %", "Memory %", "Processes");
    let mut printed = 0;
    while printed < samples {
        std::thread::sleep(interval);
        if !sampler.is_running() {
            break;
        }
        if let Some(m) = sampler.latest() {
            printed += 1;
            println!(
                "{:<10} {:>8.1} {:>10.1} {:>10}",
                printed,
                m.cpu_percent,
                m.memory_percent(),
                m.process_count
            );
        }
    }

    let _ = sampler.stop();
    Ok(())
}
