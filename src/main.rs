//! Ricochet - Second-order vulnerability detection CLI

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing_subscriber::EnvFilter;
use url::Url;

use ricochet::config::{resolve_db_path, ClientOptions, PollConfig};
use ricochet::error::{Result, RicochetError};
use ricochet::external::InteractshClient;
use ricochet::http::{HttpClient, RateLimiter};
use ricochet::inject::{load_payloads, Injector};
use ricochet::listener::{shutdown_channel, shutdown_on_ctrl_c};
use ricochet::models::{unix_now, Finding, InjectionResult, Severity};
use ricochet::output;
use ricochet::poll::poll_for_callbacks;
use ricochet::report::write_reports;
use ricochet::request::{
    extract_vectors, load_crawl_vectors, parse_request, RawRequest, Vector,
};
use ricochet::store::Store;
use ricochet::token;
use ricochet::triggers::{ActiveTrigger, TriggerSuggester};

/// Ricochet - Second-order vulnerability detection via OOB callback correlation
#[derive(Parser)]
#[command(name = "ricochet", version, about, long_about = None)]
struct Cli {
    /// Database path (default: ~/.ricochet/ricochet.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Increase log verbosity (-v for debug)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start callback listeners to receive OOB interactions
    Listen {
        /// Start the HTTP callback listener
        #[arg(long)]
        http: bool,

        /// Start the DNS callback listener
        #[arg(long)]
        dns: bool,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// HTTP listener port
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// DNS listener port (53 needs elevated capability)
        #[arg(long, default_value_t = 5353)]
        dns_port: u16,
    },

    /// Inject payloads into a target request
    Inject {
        #[command(flatten)]
        opts: InjectOpts,
    },

    /// Inject, then adaptively poll for callbacks from the batch
    Passive {
        #[command(flatten)]
        opts: InjectOpts,

        /// Starting poll interval in seconds
        #[arg(long, default_value_t = 5.0)]
        poll_interval: f64,

        /// Total polling budget in seconds
        #[arg(long, default_value_t = 3600.0)]
        poll_timeout: f64,
    },

    /// Probe common second-order endpoints to trigger stored payloads
    Active {
        /// Target base URL
        #[arg(short = 'u', long)]
        url: String,

        /// File of endpoints to probe (default: built-in catalog)
        #[arg(long)]
        endpoints: Option<PathBuf>,

        /// Requests per second
        #[arg(long, default_value_t = 2.0)]
        rate: f64,

        /// HTTP/HTTPS proxy URL
        #[arg(long)]
        proxy: Option<String>,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 10.0)]
        timeout: f64,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,
    },

    /// Suggest where an injected payload might execute
    Suggest {
        /// Parameter name to look up
        #[arg(long)]
        param: Option<String>,

        /// Correlation token of a recorded injection
        #[arg(long)]
        correlation_id: Option<String>,

        /// Suggest for the N most recent injections
        #[arg(long)]
        recent: Option<i64>,
    },

    /// List correlated findings
    Findings {
        /// Output format
        #[arg(short = 'o', long, default_value = "text")]
        output: OutputFormat,

        /// Only findings received within the last N hours
        #[arg(long)]
        since: Option<f64>,

        /// Minimum severity (high, medium, low, info)
        #[arg(long)]
        min_severity: Option<Severity>,

        /// Include payloads, headers, and callback bodies
        #[arg(long)]
        verbose: bool,
    },

    /// Render bug-bounty reports from findings
    Report {
        /// Correlation token to report on
        #[arg(long)]
        correlation_id: Option<String>,

        /// Report on every finding in the store
        #[arg(long)]
        all: bool,

        /// Output directory
        #[arg(long, default_value = "reports")]
        output: PathBuf,
    },

    /// Mint Interactsh callback URLs and poll self-hosted servers
    Interactsh {
        action: InteractshAction,

        /// Interactsh server hostname
        #[arg(long, default_value = "oast.pro")]
        server: String,

        /// Specific correlation token (minted fresh if omitted)
        #[arg(long)]
        correlation_id: Option<String>,

        /// Secret for authenticated polling
        #[arg(long)]
        secret: Option<String>,
    },
}

#[derive(Args)]
struct InjectOpts {
    /// Target URL (with -p PARAM)
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Parameter to inject into (with -u URL)
    #[arg(short = 'p', long)]
    param: Option<String>,

    /// Burp-style raw request file
    #[arg(short = 'r', long)]
    request: Option<PathBuf>,

    /// Crawler vector file (JSON) to inject across
    #[arg(long)]
    from_crawl: Option<PathBuf>,

    /// Inline payload template containing {{CALLBACK}}
    #[arg(long)]
    payload: Option<String>,

    /// Payload template file, one template per line
    #[arg(long)]
    payloads: Option<PathBuf>,

    /// Callback base URL embedded into payloads
    #[arg(long)]
    callback: String,

    /// Context tag recorded with each injection (e.g. xss:html)
    #[arg(long)]
    context: Option<String>,

    /// Outbound requests per second
    #[arg(long, default_value_t = 10.0)]
    rate: f64,

    /// Rate limiter burst capacity
    #[arg(long, default_value_t = 1)]
    burst: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// HTTP/HTTPS proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Use HTTPS for request-file targets
    #[arg(long)]
    https: bool,

    /// Record injections without sending anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum InteractshAction {
    Url,
    Poll,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbosity > 0 {
        "ricochet=debug"
    } else {
        "ricochet=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let db_path = resolve_db_path(cli.db.clone())?;
    let store = Store::open(&db_path).await?;

    match cli.command {
        Commands::Listen {
            http,
            dns,
            host,
            port,
            dns_port,
        } => cmd_listen(http, dns, &host, port, dns_port, store).await,

        Commands::Inject { opts } => {
            let results = run_injection(&opts, &store).await?;
            match results {
                Some(results) => {
                    print_injection_results(&results);
                    Ok(0)
                }
                None => Ok(2),
            }
        }

        Commands::Passive {
            opts,
            poll_interval,
            poll_timeout,
        } => cmd_passive(&opts, poll_interval, poll_timeout, store).await,

        Commands::Active {
            url,
            endpoints,
            rate,
            proxy,
            timeout,
            insecure,
        } => cmd_active(&url, endpoints.as_deref(), rate, proxy, timeout, insecure).await,

        Commands::Suggest {
            param,
            correlation_id,
            recent,
        } => cmd_suggest(param, correlation_id, recent, &store).await,

        Commands::Findings {
            output,
            since,
            min_severity,
            verbose,
        } => cmd_findings(output, since, min_severity, verbose, &store).await,

        Commands::Report {
            correlation_id,
            all,
            output,
        } => cmd_report(correlation_id, all, &output, &store).await,

        Commands::Interactsh {
            action,
            server,
            correlation_id,
            secret,
        } => cmd_interactsh(action, &server, correlation_id, secret, &store).await,
    }
}

async fn cmd_listen(
    http: bool,
    dns: bool,
    host: &str,
    port: u16,
    dns_port: u16,
    store: Store,
) -> Result<i32> {
    if !http && !dns {
        eprintln!("error: specify --http or --dns to start a callback listener");
        eprintln!("  Example: ricochet listen --http");
        eprintln!("  Example: ricochet listen --dns");
        return Ok(2);
    }

    let (tx, rx) = shutdown_channel();
    shutdown_on_ctrl_c(tx);

    let mut handles = Vec::new();
    if http {
        eprintln!(
            "{} HTTP callback listener on {}:{}",
            "ricochet".cyan().bold(),
            host,
            port
        );
        let store = store.clone();
        let host = host.to_string();
        let rx = rx.clone();
        handles.push(tokio::spawn(async move {
            ricochet::listener::http_server::run_http_listener(&host, port, store, rx).await
        }));
    }
    if dns {
        eprintln!(
            "{} DNS callback listener on {}:{}",
            "ricochet".cyan().bold(),
            host,
            dns_port
        );
        let store = store.clone();
        let host = host.to_string();
        let rx = rx.clone();
        handles.push(tokio::spawn(async move {
            ricochet::listener::dns_server::run_dns_listener(&host, dns_port, store, rx).await
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(result) => result?,
            Err(e) => return Err(RicochetError::Config(format!("listener task failed: {e}"))),
        }
    }
    Ok(0)
}

/// Shared injection runner for `inject` and `passive`. Returns None on a
/// usage error (already printed), otherwise the batch results.
async fn run_injection(
    opts: &InjectOpts,
    store: &Store,
) -> Result<Option<Vec<InjectionResult>>> {
    let templates: Vec<String> = match (&opts.payload, &opts.payloads) {
        (Some(template), None) => vec![template.clone()],
        (None, Some(path)) => load_payloads(path)?,
        _ => {
            eprintln!("error: provide exactly one of --payload or --payloads");
            return Ok(None);
        }
    };
    if templates.is_empty() {
        eprintln!("error: payload file contains no templates");
        return Ok(None);
    }

    let options = ClientOptions {
        timeout_secs: opts.timeout,
        verify_tls: !opts.insecure,
        proxy: opts.proxy.clone(),
        follow_redirects: false,
    };
    let client = HttpClient::new(&options)?;
    let rate_limiter = Arc::new(RateLimiter::new(opts.rate, opts.burst));
    let mut injector = Injector::new(
        store.clone(),
        client,
        rate_limiter,
        opts.callback.clone(),
    )
    .with_context(opts.context.clone())
    .with_dry_run(opts.dry_run);

    let mut results = Vec::new();

    if let Some(crawl_path) = &opts.from_crawl {
        let crawl = load_crawl_vectors(crawl_path)?;
        eprintln!("loaded {} vectors from crawl file", crawl.len());
        for entry in &crawl {
            let (request, vector) = entry.to_request()?;
            injector.set_https(entry.url.starts_with("https://"));
            results.extend(
                injector
                    .inject_multi(&request, std::slice::from_ref(&vector), &templates)
                    .await?,
            );
        }
        return Ok(Some(results));
    }

    let (request, https, param) = match (&opts.url, &opts.request) {
        (Some(target), None) => {
            let Some(param) = opts.param.clone() else {
                eprintln!("error: -u URL requires -p PARAM");
                return Ok(None);
            };
            let (request, https) = request_from_url(target, &param)?;
            (request, https, Some(param))
        }
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path)?;
            let request = match parse_request(&raw) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("error: {e}");
                    return Ok(None);
                }
            };
            (request, opts.https, opts.param.clone())
        }
        _ => {
            eprintln!("error: provide one of -u URL -p PARAM, -r REQUEST_FILE, or --from-crawl");
            return Ok(None);
        }
    };

    injector.set_https(https);

    let vectors: Vec<Vector> = {
        let all = extract_vectors(&request);
        match &param {
            Some(name) => {
                let filtered: Vec<Vector> =
                    all.into_iter().filter(|v| &v.name == name).collect();
                if filtered.is_empty() {
                    eprintln!("error: parameter '{name}' not found in request");
                    return Ok(None);
                }
                filtered
            }
            None => all,
        }
    };
    eprintln!(
        "injecting {} template(s) across {} vector(s)",
        templates.len(),
        vectors.len()
    );

    results.extend(injector.inject_multi(&request, &vectors, &templates).await?);
    Ok(Some(results))
}

/// Builds a synthetic GET request from a bare URL, ensuring the chosen
/// parameter exists in the query string.
fn request_from_url(target: &str, param: &str) -> Result<(RawRequest, bool)> {
    let url = Url::parse(target)?;
    let https = url.scheme() == "https";
    let host = url
        .host_str()
        .ok_or_else(|| RicochetError::Config(format!("URL without host: {target}")))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut pairs: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if !pairs.iter().any(|p| p.split('=').next() == Some(param)) {
        pairs.push(format!("{param}="));
    }
    let path = format!("{}?{}", url.path(), pairs.join("&"));

    Ok((
        RawRequest {
            method: "GET".to_string(),
            path,
            http_version: "HTTP/1.1".to_string(),
            headers: vec![("Host".to_string(), host.clone())],
            body: None,
            host,
        },
        https,
    ))
}

fn print_injection_results(results: &[InjectionResult]) {
    let mut builder = Builder::default();
    builder.push_record(["Token", "Vector", "Outcome"]);
    for result in results {
        let outcome = match (&result.status, &result.error) {
            (Some(status), _) => status.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => "-".to_string(),
        };
        builder.push_record([
            result.token.clone(),
            format!("{}:{}", result.vector.location, result.vector.name),
            outcome,
        ]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} injection(s) recorded{}",
        results.len(),
        if results.iter().any(|r| r.dry_run) {
            " (dry run, nothing sent)"
        } else {
            ""
        }
    );
}

async fn cmd_passive(
    opts: &InjectOpts,
    poll_interval: f64,
    poll_timeout: f64,
    store: Store,
) -> Result<i32> {
    let batch_start = unix_now();
    let Some(results) = run_injection(opts, &store).await? else {
        return Ok(2);
    };
    print_injection_results(&results);

    let batch_tokens: std::collections::HashSet<String> =
        results.iter().map(|r| r.token.clone()).collect();

    let config = PollConfig {
        base_interval: poll_interval,
        timeout: poll_timeout,
        ..PollConfig::default()
    };

    let (tx, rx) = shutdown_channel();
    shutdown_on_ctrl_c(tx);

    eprintln!(
        "polling for callbacks (base {poll_interval}s, budget {poll_timeout}s, Ctrl-C to stop)"
    );

    let mut batch_findings: u64 = 0;
    let total = poll_for_callbacks(&store, &config, None, Some(batch_start), rx, |findings| {
        let relevant: Vec<Finding> = findings
            .iter()
            .filter(|f| batch_tokens.contains(&f.token))
            .cloned()
            .collect();
        if !relevant.is_empty() {
            batch_findings += relevant.len() as u64;
            let mut stdout = std::io::stdout();
            let _ = output::write_text(&relevant, &mut stdout, true);
        }
    })
    .await?;

    eprintln!(
        "polling finished: {batch_findings} finding(s) for this batch ({total} observed in total)"
    );
    Ok(0)
}

async fn cmd_active(
    base_url: &str,
    endpoints_file: Option<&std::path::Path>,
    rate: f64,
    proxy: Option<String>,
    timeout: f64,
    insecure: bool,
) -> Result<i32> {
    let options = ClientOptions {
        timeout_secs: timeout,
        verify_tls: !insecure,
        proxy,
        follow_redirects: false,
    };
    let client = HttpClient::new(&options)?;
    let trigger = ActiveTrigger::new(base_url, client, rate);

    let custom: Option<Vec<String>> = match endpoints_file {
        Some(path) => Some(
            std::fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
        ),
        None => None,
    };

    eprintln!(
        "probing {} endpoints on {}",
        custom
            .as_ref()
            .map(|c| c.len())
            .unwrap_or(ricochet::triggers::TRIGGER_ENDPOINTS.len()),
        trigger.base_url()
    );

    let results = trigger
        .probe_all(custom.as_deref(), |result| match result.status {
            Some(status) if status < 400 => {
                println!(
                    "{} {} ({} bytes)",
                    format!("[{status}]").green(),
                    result.endpoint,
                    result.response_size
                );
            }
            Some(status) => {
                println!("{} {}", format!("[{status}]").yellow(), result.endpoint);
            }
            None => {
                eprintln!(
                    "[---] {} ({})",
                    result.endpoint,
                    result.error.as_deref().unwrap_or("failed")
                );
            }
        })
        .await?;

    let reachable = results
        .iter()
        .filter(|r| matches!(r.status, Some(s) if s < 400))
        .count();
    eprintln!("{reachable}/{} endpoints reachable", results.len());
    Ok(0)
}

async fn cmd_suggest(
    param: Option<String>,
    correlation_id: Option<String>,
    recent: Option<i64>,
    store: &Store,
) -> Result<i32> {
    let suggester = TriggerSuggester::new();

    let targets: Vec<(String, Option<String>)> = if let Some(param) = param {
        vec![(param, None)]
    } else if let Some(token) = correlation_id {
        match store.get_injection(&token).await? {
            Some(injection) => vec![(injection.parameter, Some(injection.token))],
            None => {
                eprintln!("no injection recorded for token {token}");
                return Ok(1);
            }
        }
    } else if let Some(n) = recent {
        store
            .list_injections(n)
            .await?
            .into_iter()
            .map(|i| (i.parameter, Some(i.token)))
            .collect()
    } else {
        eprintln!("error: provide one of --param, --correlation-id, or --recent");
        return Ok(2);
    };

    for (parameter, token) in targets {
        match &token {
            Some(token) => println!(
                "Suggestions for parameter '{parameter}' (token {token}):"
            ),
            None => println!("Suggestions for parameter '{parameter}':"),
        }
        let suggestions = suggester.suggestions_for_param(&parameter);
        if suggestions.is_empty() {
            println!("  (no pattern match; try the active prober)");
        }
        for suggestion in suggestions {
            println!(
                "  [{}] {} - {}",
                suggestion.likelihood, suggestion.location, suggestion.description
            );
            for (i, step) in suggestion.manual_steps.iter().enumerate() {
                println!("      {}. {step}", i + 1);
            }
        }
        println!();
    }
    Ok(0)
}

async fn cmd_findings(
    format: OutputFormat,
    since_hours: Option<f64>,
    min_severity: Option<Severity>,
    verbose: bool,
    store: &Store,
) -> Result<i32> {
    let since = since_hours.map(|hours| unix_now() - hours * 3600.0);
    let findings = store.get_findings(since, min_severity).await?;

    let mut stdout = std::io::stdout();
    match format {
        OutputFormat::Json => output::write_jsonl(&findings, &mut stdout, verbose)?,
        OutputFormat::Text => output::write_text(&findings, &mut stdout, verbose)?,
    }
    Ok(0)
}

async fn cmd_report(
    correlation_id: Option<String>,
    all: bool,
    output_dir: &std::path::Path,
    store: &Store,
) -> Result<i32> {
    let findings = match (&correlation_id, all) {
        (Some(token), false) => {
            let all_findings = store.get_findings(None, None).await?;
            all_findings
                .into_iter()
                .filter(|f| &f.token == token)
                .collect::<Vec<_>>()
        }
        (None, true) => {
            let confirmed = store.injections_with_callbacks().await?;
            eprintln!(
                "{} injection(s) with confirmed callbacks",
                confirmed.len()
            );
            store.get_findings(None, None).await?
        }
        _ => {
            eprintln!("error: provide either --correlation-id TOKEN or --all");
            return Ok(2);
        }
    };

    if findings.is_empty() {
        eprintln!("no findings to report on");
        return Ok(0);
    }

    let written = write_reports(&findings, output_dir)?;
    for path in &written {
        println!("{}", path.display());
    }
    eprintln!("{} report(s) written to {}", written.len(), output_dir.display());
    Ok(0)
}

async fn cmd_interactsh(
    action: InteractshAction,
    server: &str,
    correlation_id: Option<String>,
    secret: Option<String>,
    store: &Store,
) -> Result<i32> {
    match action {
        InteractshAction::Url => {
            let correlation_id = correlation_id.unwrap_or_else(token::mint);
            let client = InteractshClient::new(server, &correlation_id, secret);

            println!("Correlation ID: {}", client.correlation_id());
            println!("HTTP callback: {}", client.generate_url("http"));
            println!("DNS callback: {}", client.generate_url("dns"));
            eprintln!();
            eprintln!("Use these URLs in your payloads. Monitor with:");
            eprintln!(
                "  ricochet interactsh poll --correlation-id {}",
                client.correlation_id()
            );
            eprintln!("For public servers, poll with the official interactsh-client.");

            client.register_placeholder(store).await?;
            Ok(0)
        }
        InteractshAction::Poll => {
            let Some(correlation_id) = correlation_id else {
                eprintln!("error: --correlation-id required for poll");
                return Ok(2);
            };
            let client = InteractshClient::new(server, &correlation_id, secret);

            eprintln!("polling {server} for interactions...");
            eprintln!("(works only with self-hosted servers running --no-encryption)");
            let interactions = client.poll(Some(store)).await;

            if interactions.is_empty() {
                println!("No interactions found (or server requires encryption).");
            } else {
                println!("Found {} interaction(s):", interactions.len());
                for (i, interaction) in interactions.iter().enumerate() {
                    println!(
                        "\n{}. [{}] from {}",
                        i + 1,
                        interaction.protocol.to_uppercase(),
                        interaction.remote_address
                    );
                    println!("   Timestamp: {}", interaction.timestamp);
                    if !interaction.raw_request.is_empty() {
                        let preview: String = interaction.raw_request.chars().take(100).collect();
                        println!("   Request: {preview}");
                    }
                }
            }
            Ok(0)
        }
    }
}
