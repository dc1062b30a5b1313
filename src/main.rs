use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use sheet_sync::config;
use sheet_sync::database::PersistedLead;
use sheet_sync::pipeline::mapper::ColumnOverride;
use sheet_sync::pipeline::notify::WebhookNotifier;
use sheet_sync::pipeline::validator::format_file_size;
use sheet_sync::view::DEFAULT_PAGE_SIZE;
use sheet_sync::Pipeline;
use sheet_sync::PipelineState;
use sheet_sync::RecordQueryView;
use sheet_sync::Settings;
use sheet_sync::Upload;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sheet-sync", version, about = "Upload Excel lead sheets to a datastore and browse the stored records")]
struct Cli {
    #[command(flatten)]
    datastore: DatastoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DatastoreArgs {
    /// Base URL of the REST datastore
    #[arg(long, env = config::DATASTORE_URL)]
    datastore_url: Option<String>,

    /// Access key sent with every datastore request
    #[arg(long, env = config::DATASTORE_KEY, hide_env_values = true)]
    datastore_key: Option<String>,

    /// Use a local DuckDB database file instead of the REST datastore
    #[arg(long, env = config::LOCAL_DATABASE)]
    local: Option<PathBuf>,

    /// Table holding the leads [default: leads]
    #[arg(long, env = config::TABLE)]
    table: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, parse and upload a workbook, then notify the webhook
    Ingest {
        /// The .xlsx or .xls file to upload
        file: Option<PathBuf>,

        /// Declared media type of the file
        #[arg(long, default_value = "")]
        media_type: String,

        /// Endpoint notified once every record is stored
        #[arg(long, env = config::WEBHOOK_URL)]
        webhook_url: Option<String>,

        /// Records per insert request [default: 50]
        #[arg(long, env = config::CHUNK_SIZE)]
        chunk_size: Option<String>,

        /// Pause between two insert requests in milliseconds [default: 200]
        #[arg(long, env = config::CHUNK_DELAY_MS)]
        chunk_delay_ms: Option<String>,

        /// Read a lead field from another column, e.g. company_name=Company
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        columns: Vec<ColumnOverride>,
    },

    /// List stored records, newest first
    View {
        /// Only records whose company, website or funding round contains this text
        #[arg(long, default_value = "")]
        search: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let datastore = cli.datastore;
    match cli.command {
        Command::Ingest { file, media_type, webhook_url, chunk_size, chunk_delay_ms, columns } => {
            let settings = Settings::from_lookup(|key| match key {
                config::WEBHOOK_URL => webhook_url.clone(),
                config::CHUNK_SIZE => chunk_size.clone(),
                config::CHUNK_DELAY_MS => chunk_delay_ms.clone(),
                _ => datastore.lookup(key),
            })?
            .with_columns(columns);
            ingest(settings, file, media_type).await
        }
        Command::View { search, page, page_size } => {
            let settings = Settings::from_lookup(|key| datastore.lookup(key))?;
            view(settings, &search, page, page_size).await
        }
    }
}

impl DatastoreArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            config::DATASTORE_URL => self.datastore_url.clone(),
            config::DATASTORE_KEY => self.datastore_key.clone(),
            config::LOCAL_DATABASE => self.local.as_ref().map(|path| path.display().to_string()),
            config::TABLE => self.table.clone(),
            _ => None,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn ingest(settings: Settings, file: Option<PathBuf>, media_type: String) -> Result<()> {
    let store = settings.datastore.connect().context("Failed to open datastore")?;
    let notifier = WebhookNotifier::new().context("Failed to create webhook client")?;
    let mut pipeline = Pipeline::new(settings.mapper(), settings.ingestor(store), notifier);

    let upload = match file {
        Some(path) => {
            let upload = Upload::from_path(&path, media_type)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("{} ({})", upload.name, format_file_size(upload.bytes.len() as u64));
            Some(upload)
        }
        None => None,
    };

    match pipeline.run(upload, &settings.webhook_url).await? {
        PipelineState::Done(report) => {
            println!("{}", report.message());
            if let Some(error) = &report.notification_error {
                eprintln!("Warning: {error}");
            }
            Ok(())
        }
        PipelineState::Failed(failure) => {
            if let Some(outcome) = &failure.outcome {
                eprintln!(
                    "{} of {} attempted records were stored; resubmit from record {}",
                    outcome.succeeded,
                    outcome.attempted,
                    outcome.resume_from() + 1
                );
            }
            bail!("{}", failure.error)
        }
        other => bail!("Upload stopped while {}", other.status()),
    }
}

async fn view(settings: Settings, search: &str, page: usize, page_size: usize) -> Result<()> {
    let store = settings.datastore.connect().context("Failed to open datastore")?;
    let mut view = RecordQueryView::new(store, settings.table.clone()).with_page_size(page_size);
    view.load().await?;
    view.search(search);
    view.go_to(page);

    let current = view.current();
    if current.records.is_empty() {
        println!("No records found");
        return Ok(());
    }
    println!(
        "Company\tLinkedIn\tWebsite\tFunding Round\tFunding Date\tFunding Amount\tScore\tScore Ranking\tDecision Maker LinkedIn\tDecision Maker Email"
    );
    for lead in &current.records {
        println!("{}", render_row(lead));
    }
    if current.total_pages > 1 {
        if let Some(showing) = current.showing() {
            println!("{showing}");
        }
        let links: Vec<String> = view
            .page_links()
            .into_iter()
            .map(|number| if number == current.number { format!("[{number}]") } else { number.to_string() })
            .collect();
        println!("Pages: {}", links.join(" "));
    }
    Ok(())
}

fn render_row(lead: &PersistedLead) -> String {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    [
        text(&lead.company_name),
        text(&lead.linkedin_url),
        text(&lead.website_url),
        text(&lead.funding_round),
        text(&lead.funding_date),
        text(&lead.funding_amount),
        lead.score.map(|score| score.to_string()).unwrap_or_default(),
        text(&lead.score_detail),
        text(&lead.decision_maker_linkedin),
        text(&lead.decision_maker_email),
    ]
    .join("\t")
}
