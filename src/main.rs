use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use itinerary_forge::export::{
    ChromeRasterizer, CopyButton, CopyStatus, MailtoShareSheet, PageSize, PdfExporter,
    ShareAction, ShareOutcome, ShareSheet, SystemClipboard,
};
use itinerary_forge::generation::create_provider;
use itinerary_forge::prompts::PromptBuilder;
use itinerary_forge::server::{self, AppState};
use itinerary_forge::unlock::{FileSessionStore, SubmissionOutcome};
use itinerary_forge::{
    AppConfig, BudgetTier, Destination, FileOutputWriter, GenerationGateway,
    HttpGenerationClient, InMemoryRateLimiter, ItineraryBackend, ItineraryExport, LeadContact,
    LeadSinks, LocalBackend, OutputWriter, Place, RetryPolicy, RevealFraction, TripRequest,
    UnlockController, UnlockState, format_itinerary, split_html,
};
use itinerary_forge::output::write_pages;

/// itinerary-forge: AI trip itineraries with a partial reveal and a lead-gated unlock
#[derive(Parser, Debug)]
#[command(name = "itinerary-forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP generation gateway
    Serve(ServeArgs),

    /// Generate an itinerary and walk through the unlock flow in the terminal
    Generate(GenerateArgs),

    /// Format and split a local itinerary text file
    Split(SplitArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory with primary.j2 / fallback.j2 prompt overrides
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Destination, as typed in the trip form
    #[arg(short, long)]
    destination: Option<String>,

    /// Latitude of the picked place
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude of the picked place
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Budget tier: Economical, Mid-range or Luxury
    #[arg(short, long, default_value = "Mid-range")]
    budget: BudgetTier,

    /// Kind of trip (e.g., "Honeymoon", "Family")
    #[arg(short, long, default_value = "Leisure")]
    trip_type: String,

    /// Number of days
    #[arg(long, default_value = "3")]
    days: u32,

    /// Call a running gateway instead of the providers directly
    #[arg(long)]
    gateway_url: Option<String>,

    /// Resume a session; without --destination its stored itinerary is shown
    #[arg(short, long)]
    session: Option<String>,

    /// Share of the itinerary shown before unlocking (0.0-1.0, exclusive)
    #[arg(long)]
    reveal_fraction: Option<f64>,

    /// Write HTML, text and metadata exports here after unlocking
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also render print pages into the export with a headless browser
    #[arg(long, requires = "output")]
    pages: bool,

    /// Copy the itinerary text to the clipboard after unlocking
    #[arg(long)]
    copy: bool,

    /// Share the itinerary through the mail client (copies it when none is set up)
    #[arg(long)]
    share: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with primary.j2 / fallback.j2 prompt overrides
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// Itinerary text file
    path: PathBuf,

    /// Share of the text shown before the paywall
    #[arg(long, default_value = "0.3")]
    fraction: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve(args)) => handle_serve_command(args).await,
        Some(Command::Generate(args)) => handle_generate_command(args).await,
        Some(Command::Split(args)) => handle_split_command(args),
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!("Example: itinerary-forge generate --destination Paris --days 5");
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout carries only the itinerary.
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn build_gateway(
    config: &AppConfig,
    template_dir: Option<&PathBuf>,
) -> Result<GenerationGateway> {
    let primary = create_provider(&config.generation.primary, "primary")?;
    let fallback = create_provider(&config.generation.fallback, "fallback")?;
    let limiter = Arc::new(InMemoryRateLimiter::from_config(&config.rate_limit));
    let prompts = PromptBuilder::load(template_dir.map(PathBuf::as_path))?;

    Ok(GenerationGateway::new(primary, fallback, limiter, prompts)
        .with_primary_timeout(config.generation.primary_timeout()))
}

async fn handle_serve_command(args: ServeArgs) -> Result<()> {
    init_logging(args.verbose);
    info!("itinerary-forge gateway starting");

    let mut config = AppConfig::load_or_default(args.config.as_ref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let gateway = build_gateway(&config, args.template_dir.as_ref())?;
    let state = AppState::new(Arc::new(gateway), config.server.trust_forwarded_headers);
    server::serve(&config.server, state).await
}

fn handle_split_command(args: SplitArgs) -> Result<()> {
    init_logging(args.verbose);

    let fraction = RevealFraction::new(args.fraction)?;
    let raw = std::fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read: {:?}", args.path))?;

    let split = split_html(&format_itinerary(&raw), fraction);
    println!("{}", split.visible);
    if split.is_fully_visible() {
        eprintln!("\n(nothing to lock)");
    } else {
        println!("\n----- locked -----\n");
        println!("{}", split.locked);
    }
    Ok(())
}

fn build_request(args: &GenerateArgs, destination: &str) -> TripRequest {
    let mut dest = Destination::named(destination);
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        dest = dest.with_place(Place {
            lat,
            lon,
            display_name: None,
            place_id: None,
        });
    }
    TripRequest::new(dest, args.budget, args.trip_type.clone(), args.days)
}

async fn handle_generate_command(args: GenerateArgs) -> Result<()> {
    init_logging(args.verbose);

    let mut config = AppConfig::load_or_default(args.config.as_ref())?;
    if let Some(fraction) = args.reveal_fraction {
        config.reveal.fraction = fraction;
    }
    let fraction = config.reveal.reveal_fraction()?;

    let session_dir = config.session.resolve_dir();
    let store = Arc::new(match &args.session {
        Some(id) => FileSessionStore::open(&session_dir, id)?,
        None => FileSessionStore::create(&session_dir)?,
    });
    info!("Session: {}", store.session_id());

    let sinks = LeadSinks::from_config(&config.leads)?;

    let controller = match &args.destination {
        Some(destination) => {
            let backend: Box<dyn ItineraryBackend> = match &args.gateway_url {
                Some(url) => Box::new(HttpGenerationClient::new(url)?),
                None => {
                    let gateway = build_gateway(&config, args.template_dir.as_ref())?;
                    Box::new(LocalBackend::new(Arc::new(gateway), "cli"))
                }
            };

            let request = build_request(&args, destination);
            info!(
                "Generating a {}-day {} itinerary for {}",
                request.days, request.budget, destination
            );

            let policy = RetryPolicy::from_config(&config.retry);
            let document = match policy.generate(backend.as_ref(), &request).await {
                Ok(document) => document,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };
            let destination = destination.clone();
            UnlockController::new(&document, destination, fraction, sinks, store.clone())?
        }
        None => UnlockController::restore(fraction, sinks, store.clone())?.ok_or_else(|| {
            anyhow::anyhow!("Either --destination or a --session holding an itinerary is required")
        })?,
    };

    let rendered = controller.render();
    println!("{}", rendered.html);
    println!("\n(itinerary by {})", rendered.provider_name);

    if rendered.state != UnlockState::Unlocked && controller.requires_unlock() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let delay = config.reveal.auto_prompt_delay();
        let unlocked =
            unlock_interactively(&controller, &mut lines, delay, &config.leads.source_tag).await?;
        if !unlocked {
            println!(
                "\nThe rest of your itinerary stays locked. Resume with --session {}",
                store.session_id()
            );
            return Ok(());
        }
        println!("{}", controller.render().html);
    }

    if let Some(dir) = &args.output {
        let html = controller.unlocked_html().context("Itinerary is still locked")?;
        let export = ItineraryExport {
            destination: controller.destination(),
            raw_text: controller.raw_text(),
            html: &html,
            provider_name: controller.provider_name(),
        };
        let out = FileOutputWriter::new(dir).write_itinerary(&export).await?;
        println!("Exported to {}", out.display());

        if args.pages {
            let rasterizer = Arc::new(ChromeRasterizer::new(&config.export.browser));
            let document = PdfExporter::new(rasterizer)
                .with_page_size(PageSize::from(&config.export))
                .export(&controller)
                .await?;
            let pages = write_pages(&out, &document).await?;
            println!("Rendered {} page(s)", pages.len());
        }
    }

    if args.copy || args.share {
        share_or_copy(&controller, &config, args.share, args.copy).await?;
    }

    Ok(())
}

/// Run the share and copy buttons against the system clipboard
async fn share_or_copy(
    controller: &UnlockController,
    config: &AppConfig,
    share: bool,
    copy: bool,
) -> Result<()> {
    if controller.unlocked_html().is_none() {
        anyhow::bail!("Itinerary is still locked");
    }

    let clipboard = SystemClipboard::new()?;
    let button = Arc::new(
        CopyButton::new(Arc::new(clipboard)).with_feedback(config.export.copy_feedback()),
    );

    if share {
        let sheet: Arc<dyn ShareSheet> = Arc::new(MailtoShareSheet);
        let action = ShareAction::new(Some(sheet), button.clone(), &config.export.share_url);
        match action
            .share(controller.destination(), controller.raw_text())
            .await?
        {
            ShareOutcome::Shared => println!("Opened your mail client"),
            ShareOutcome::Copied => println!("No mail client found, itinerary copied instead"),
            ShareOutcome::Cancelled => {}
        }
    }

    if copy {
        button.copy(controller.raw_text()).await?;
    }

    if button.status() == CopyStatus::Copied {
        println!("Copied!");
        // The clipboard is served from this process until the label resets
        tokio::time::sleep(config.export.copy_feedback()).await;
    }
    Ok(())
}

/// Wait for Enter or the auto-prompt timer, then run the contact form.
/// Returns whether the itinerary ended up unlocked.
async fn unlock_interactively(
    controller: &UnlockController,
    lines: &mut Lines<BufReader<Stdin>>,
    delay: Duration,
    source_tag: &str,
) -> Result<bool> {
    controller.arm_auto_prompt(delay);
    println!(
        "\nPress Enter to unlock the full itinerary (the form opens in {}s).",
        delay.as_secs()
    );

    tokio::select! {
        line = lines.next_line() => {
            line?;
            controller.open_prompt();
        }
        _ = controller.wait_for_prompt() => {
            println!();
        }
    }

    loop {
        if let Some(error) = controller.prompt_error() {
            println!("! {}", error);
        }
        println!("Enter your details to see the rest (leave name empty to close).");

        let name = ask(lines, "Name").await?;
        if name.is_empty() {
            controller.dismiss();
            return Ok(false);
        }
        let email = ask(lines, "Email").await?;
        let phone = ask(lines, "Phone").await?;

        let contact = LeadContact::new(name, email, phone, source_tag);
        match controller.submit(contact).await {
            Ok(SubmissionOutcome::Unlocked) => return Ok(true),
            Ok(SubmissionOutcome::Discarded) => return Ok(false),
            // The error is kept on the controller and printed next round
            Err(_) => continue,
        }
    }
}

async fn ask(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    print!("{}: ", label);
    std::io::stdout().flush()?;
    let line = lines.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}
