use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    ApiClient, BulkOutcome, CredentialProvider, Debounced, FetchOutcome, FileCredentials,
    LeadCollectionBackend, LeadCollectionController, LeadDetailController, LeadFilter,
    LeadRecordBackend, LoadOutcome, Notice, NoticeKind, NoticeTray, Notifier, PageMove,
    QueryState, SaveOutcome, SessionEvent, SimulationBackend, SimulatorController, UploadOutcome,
};
use shared::{
    domain::{LeadId, LeadStatus, PageSize, SortKey},
    protocol::{LeadProfile, ProfileUpdate},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
    task::JoinSet,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

mod config;
mod render;

#[derive(Parser, Debug)]
#[command(name = "crm", version, about = "Lead scoring CRM from the terminal")]
struct Args {
    /// Overrides the configured API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    Register {
        username: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    #[command(subcommand)]
    Leads(LeadsCommand),
    /// Upload a CSV batch for scoring.
    Upload { file: PathBuf },
    Stats,
    /// Show the signed-in profile; any flag edits it first.
    Profile(ProfileArgs),
    /// Model summary and global feature importance.
    Insights,
    /// Score a hypothetical customer profile.
    Simulate(SimulateArgs),
}

#[derive(Subcommand, Debug)]
enum LeadsCommand {
    List(PageArgs),
    Show {
        id: i64,
    },
    Status {
        id: i64,
        status: LeadStatus,
    },
    Note {
        id: i64,
        text: String,
    },
    /// Change the status of leads shown on one page.
    BulkStatus {
        #[arg(long)]
        status: LeadStatus,
        #[arg(required = true)]
        ids: Vec<i64>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Delete leads shown on one page.
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Delete every lead in the database.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug, Clone)]
struct PageArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long)]
    limit: Option<PageSize>,
    #[arg(long)]
    sort: Option<SortKey>,
    /// NAME=VALUE with NAME one of job, min_score, min_age, max_age, status.
    #[arg(long = "filter", value_name = "NAME=VALUE")]
    filters: Vec<String>,
}

#[derive(ClapArgs, Debug, Default)]
struct ProfileArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    id_emp: Option<String>,
    #[arg(long)]
    monthly_target: Option<u64>,
}

impl ProfileArgs {
    fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            name: self.name,
            role: self.role,
            email: self.email,
            id_emp: self.id_emp,
            monthly_target: self.monthly_target,
        }
    }
}

#[derive(ClapArgs, Debug)]
struct SimulateArgs {
    /// FIELD=VALUE, e.g. --set age=45 --set job=retired.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    fields: Vec<String>,
    /// Keep reading FIELD=VALUE edits from stdin and rescore after each pause.
    #[arg(long)]
    interactive: bool,
}

struct Session {
    settings: Settings,
    api: Arc<ApiClient>,
    notifier: Notifier,
    notices: broadcast::Receiver<Notice>,
    session_events: broadcast::Receiver<SessionEvent>,
    tray: NoticeTray,
    json: bool,
}

impl Session {
    fn connect(settings: Settings, json: bool) -> Result<Self> {
        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(FileCredentials::new(settings.token_path.clone()));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        let api = ApiClient::with_http(http, &settings.api_url, credentials)
            .with_context(|| format!("invalid api url '{}'", settings.api_url))?;
        let session_events = api.subscribe_session();
        let notifier = Notifier::new();
        let notices = notifier.subscribe();
        Ok(Self {
            settings,
            api: Arc::new(api),
            notifier,
            notices,
            session_events,
            tray: NoticeTray::default(),
            json,
        })
    }

    fn collection_backend(&self) -> Arc<dyn LeadCollectionBackend> {
        self.api.clone()
    }

    fn record_backend(&self) -> Arc<dyn LeadRecordBackend> {
        self.api.clone()
    }

    fn simulation_backend(&self) -> Arc<dyn SimulationBackend> {
        self.api.clone()
    }

    /// Prints queued notices; returns how many were errors.
    fn flush_notices(&mut self) -> usize {
        self.tray.drain(&mut self.notices);
        let mut errors = 0;
        for notice in self.tray.visible().to_vec() {
            match notice.kind {
                NoticeKind::Error => {
                    errors += 1;
                    eprintln!("error: {}", notice.message);
                }
                NoticeKind::Success | NoticeKind::Info => eprintln!("{}", notice.message),
            }
            self.tray.dismiss(notice.id);
        }
        errors
    }

    /// Returns `true` when the stored credential was rejected.
    fn report_session_events(&mut self) -> bool {
        let mut expired = false;
        while let Ok(event) = self.session_events.try_recv() {
            debug!(?event, "session event");
            if event == SessionEvent::Expired {
                expired = true;
            }
        }
        if expired {
            eprintln!("Session expired; run `crm login` again.");
        }
        expired
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    let mut session = Session::connect(settings, args.json)?;

    let result = run(&session, args.command).await;
    let errors_shown = session.flush_notices();
    let expired = session.report_session_events();
    let shown = errors_shown > 0 || expired;
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) if shown => {
            debug!(error = %format!("{err:#}"), "command failed after reporting");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err),
    }
}

async fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            session.api.login(&username, &password).await?;
            println!("Signed in as {username}");
        }
        Command::Register { username, password } => {
            let user = session.api.register(&username, &password).await?;
            println!("Registered {} (id {})", user.username, user.id);
        }
        Command::Logout => {
            session.api.logout()?;
            println!("Signed out");
        }
        Command::Leads(command) => leads(session, command).await?,
        Command::Upload { file } => upload(session, file).await?,
        Command::Stats => {
            let stats = session.api.dashboard_stats().await?;
            if session.json {
                render::json(&stats)?;
            } else {
                render::stats(&stats);
            }
        }
        Command::Profile(args) => {
            let update = args.into_update();
            let profile = if update.is_empty() {
                session.api.user_profile().await?
            } else {
                let profile = session.api.update_user_profile(&update).await?;
                session.notifier.success("Profile updated");
                profile
            };
            if session.json {
                render::json(&profile)?;
            } else {
                render::profile(&profile);
            }
        }
        Command::Insights => {
            let insights = session.api.model_insights().await?;
            if session.json {
                render::json(&insights)?;
            } else {
                render::insights(&insights);
            }
        }
        Command::Simulate(args) => simulate(session, args).await?,
    }
    Ok(())
}

async fn leads(session: &Session, command: LeadsCommand) -> Result<()> {
    match command {
        LeadsCommand::List(page) => {
            let controller = open_page(session, &page).await?;
            render::leads(&controller.snapshot().await, session.json)?;
        }
        LeadsCommand::Show { id } => {
            let detail = open_lead(session, id).await?;
            let snapshot = detail.snapshot().await;
            let lead = snapshot
                .lead
                .ok_or_else(|| anyhow!("lead {id} did not load"))?;
            if session.json {
                render::json(&lead)?;
            } else {
                render::lead(&lead);
            }
        }
        LeadsCommand::Status { id, status } => {
            let detail = open_lead(session, id).await?;
            detail.set_draft_status(status).await;
            match detail.update_status().await {
                SaveOutcome::Unchanged => println!("Lead {id} already has status {status}"),
                outcome => finish_save(outcome)?,
            }
        }
        LeadsCommand::Note { id, text } => {
            let detail = open_lead(session, id).await?;
            detail.set_draft_note(text).await;
            finish_save(detail.save_note().await)?;
        }
        LeadsCommand::BulkStatus { status, ids, page } => {
            let controller = open_page(session, &page).await?;
            select(&controller, &ids).await;
            finish_bulk(controller.bulk_update_status(status).await)?;
            render::leads(&controller.snapshot().await, session.json)?;
        }
        LeadsCommand::BulkDelete { ids, yes, page } => {
            let controller = open_page(session, &page).await?;
            select(&controller, &ids).await;
            let pending = controller
                .request_bulk_delete()
                .await
                .ok_or_else(|| anyhow!("none of the given leads are on the selected page"))?;
            if !yes && !confirm(&format!("Delete {} lead(s)? This cannot be undone.", pending.len()))? {
                println!("Nothing deleted");
                return Ok(());
            }
            finish_bulk(controller.confirm_bulk_delete(pending).await)?;
            render::leads(&controller.snapshot().await, session.json)?;
        }
        LeadsCommand::Clear { yes } => {
            if !yes && !confirm("Delete ALL leads? This cannot be undone.")? {
                println!("Nothing deleted");
                return Ok(());
            }
            let ack = session.api.clear_leads().await?;
            session.notifier.success(if ack.message.trim().is_empty() {
                "All leads deleted".to_string()
            } else {
                ack.message
            });
        }
    }
    Ok(())
}

async fn open_page(session: &Session, page: &PageArgs) -> Result<Arc<LeadCollectionController>> {
    let mut query = QueryState {
        limit: page.limit.unwrap_or(session.settings.page_size),
        sort: page.sort.unwrap_or_default(),
        ..QueryState::default()
    };
    for raw in &page.filters {
        let (name, value) = split_pair(raw)?;
        query.filters.apply(LeadFilter::parse(name, value)?);
    }

    let controller = LeadCollectionController::with_query(
        session.collection_backend(),
        session.notifier.clone(),
        query,
    );
    expect_applied(controller.fetch_page().await)?;

    let target = page.page.saturating_sub(1);
    if target > 0 {
        match controller.go_to_page(target).await {
            PageMove::Moved(outcome) => expect_applied(outcome)?,
            PageMove::Ignored => bail!(
                "page {} is past the end ({} matching leads)",
                page.page,
                controller.snapshot().await.total_found
            ),
        }
    }
    Ok(controller)
}

async fn open_lead(session: &Session, id: i64) -> Result<Arc<LeadDetailController>> {
    let detail = LeadDetailController::new(
        session.record_backend(),
        session.notifier.clone(),
        LeadId(id),
    );
    match detail.load().await {
        LoadOutcome::Loaded => Ok(detail),
        LoadOutcome::Failed(err) => Err(err.into()),
        LoadOutcome::Superseded(_) | LoadOutcome::Cancelled => bail!("loading lead {id} was interrupted"),
    }
}

async fn select(controller: &LeadCollectionController, ids: &[i64]) {
    for &id in ids {
        if !controller.toggle_select(LeadId(id)).await {
            eprintln!("lead {id} is not on this page; skipping");
        }
    }
}

async fn upload(session: &Session, file: PathBuf) -> Result<()> {
    let contents = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("'{}' has no usable file name", file.display()))?;

    let controller = LeadCollectionController::with_query(
        session.collection_backend(),
        session.notifier.clone(),
        QueryState {
            limit: session.settings.page_size,
            ..QueryState::default()
        },
    );
    match controller.upload_csv(filename, contents).await {
        UploadOutcome::Completed { refresh, .. } => {
            expect_applied(refresh)?;
            render::leads(&controller.snapshot().await, session.json)
        }
        UploadOutcome::Failed(err) => Err(err.into()),
        UploadOutcome::Busy | UploadOutcome::Cancelled => bail!("upload was interrupted"),
    }
}

async fn simulate(session: &Session, args: SimulateArgs) -> Result<()> {
    let mut profile = LeadProfile::default();
    for raw in &args.fields {
        let (name, value) = split_pair(raw)?;
        set_profile_field(&mut profile, name, value)?;
    }
    let controller = SimulatorController::with_quiet_period(
        session.simulation_backend(),
        session.notifier.clone(),
        Duration::from_millis(session.settings.simulator_debounce_ms),
    );
    let json = session.json;

    if !args.interactive {
        return match controller.update(profile).await {
            Debounced::Ready(Ok(_)) => render::simulation(&controller.snapshot().await, json),
            Debounced::Ready(Err(err)) => Err(err.into()),
            Debounced::Superseded | Debounced::Cancelled => bail!("simulation was interrupted"),
        };
    }

    println!("Enter FIELD=VALUE edits; an empty line ends the session.");
    let mut scoring = JoinSet::new();
    let spawn_update = |scoring: &mut JoinSet<Result<()>>, profile: LeadProfile| {
        let controller = controller.clone();
        scoring.spawn(async move {
            match controller.update(profile).await {
                Debounced::Ready(Ok(_)) => render::simulation(&controller.snapshot().await, json),
                _ => Ok(()),
            }
        });
    };
    spawn_update(&mut scoring, profile.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let edit = split_pair(line).and_then(|(name, value)| set_profile_field(&mut profile, name, value));
        match edit {
            Ok(()) => spawn_update(&mut scoring, profile.clone()),
            Err(err) => eprintln!("{err:#}"),
        }
    }
    while let Some(joined) = scoring.join_next().await {
        joined??;
    }
    Ok(())
}

fn expect_applied(outcome: FetchOutcome) -> Result<()> {
    match outcome {
        FetchOutcome::Applied { .. } => Ok(()),
        FetchOutcome::Failed(err) => Err(err.into()),
        FetchOutcome::Superseded(_) | FetchOutcome::Cancelled => bail!("lead listing was interrupted"),
    }
}

fn finish_bulk(outcome: BulkOutcome) -> Result<()> {
    match outcome {
        BulkOutcome::Completed { refresh, .. } => expect_applied(refresh),
        BulkOutcome::NothingSelected => bail!("none of the given leads are on the selected page"),
        BulkOutcome::Busy => bail!("another bulk action is still running"),
        BulkOutcome::Cancelled => bail!("bulk action cancelled"),
        BulkOutcome::Failed(err) => Err(err.into()),
    }
}

fn finish_save(outcome: SaveOutcome) -> Result<()> {
    match outcome {
        SaveOutcome::Saved { .. } | SaveOutcome::Unchanged => Ok(()),
        SaveOutcome::Busy | SaveOutcome::Cancelled => bail!("save was interrupted"),
        SaveOutcome::Failed(err) => Err(err.into()),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim(), value.trim()))
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{raw}'"))
}

/// Assigns one profile attribute by its wire name, keeping the field's JSON type.
fn set_profile_field(profile: &mut LeadProfile, name: &str, raw: &str) -> Result<()> {
    let mut value = serde_json::to_value(&*profile)?;
    let fields = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("profile did not serialize to an object"))?;
    let key = if name == "credit_default" { "default" } else { name };
    let slot = fields
        .get_mut(key)
        .ok_or_else(|| anyhow!("unknown profile field '{name}'"))?;
    *slot = if slot.is_number() {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(serde_json::Value::is_number)
            .ok_or_else(|| anyhow!("{name} expects a number, got '{raw}'"))?
    } else {
        serde_json::Value::String(raw.to_string())
    };
    *profile = serde_json::from_value(value).with_context(|| format!("invalid value '{raw}' for {name}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fields_are_set_by_wire_name() {
        let mut profile = LeadProfile::default();
        set_profile_field(&mut profile, "age", "58").expect("age");
        set_profile_field(&mut profile, "job", "retired").expect("job");
        set_profile_field(&mut profile, "credit_default", "unknown").expect("default");
        set_profile_field(&mut profile, "euribor3m", "1.25").expect("rate");
        assert_eq!(profile.age, 58);
        assert_eq!(profile.job, "retired");
        assert_eq!(profile.credit_default, "unknown");
        assert_eq!(profile.euribor3m, 1.25);
    }

    #[test]
    fn bad_profile_edits_are_rejected_without_change() {
        let mut profile = LeadProfile::default();
        assert!(set_profile_field(&mut profile, "salary", "10").is_err());
        assert!(set_profile_field(&mut profile, "age", "old").is_err());
        assert!(set_profile_field(&mut profile, "age", "-3").is_err());
        assert_eq!(profile, LeadProfile::default());
    }

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(split_pair("job = blue-collar").expect("pair"), ("job", "blue-collar"));
        assert_eq!(split_pair("status=").expect("pair"), ("status", ""));
        assert!(split_pair("status").is_err());
    }

    #[test]
    fn cli_parses_bulk_delete_with_page_and_filters() {
        let args = Args::try_parse_from([
            "crm",
            "leads",
            "bulk-delete",
            "4",
            "9",
            "--page",
            "2",
            "--filter",
            "status=Interested",
            "--yes",
        ])
        .expect("parse");
        match args.command {
            Command::Leads(LeadsCommand::BulkDelete { ids, yes, page }) => {
                assert_eq!(ids, vec![4, 9]);
                assert!(yes);
                assert_eq!(page.page, 2);
                assert_eq!(page.filters, vec!["status=Interested".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn profile_flags_become_a_partial_update() {
        let args = Args::try_parse_from(["crm", "profile", "--name", "Rina", "--monthly-target", "80"])
            .expect("parse");
        let Command::Profile(profile) = args.command else {
            panic!("expected profile command");
        };
        let update = profile.into_update();
        assert_eq!(update.name.as_deref(), Some("Rina"));
        assert_eq!(update.monthly_target, Some(80));
        assert!(update.role.is_none());

        let plain = Args::try_parse_from(["crm", "profile"]).expect("parse");
        let Command::Profile(profile) = plain.command else {
            panic!("expected profile command");
        };
        assert!(profile.into_update().is_empty());
    }

    #[test]
    fn clear_requires_no_ids() {
        let args = Args::try_parse_from(["crm", "leads", "clear", "--yes"]).expect("parse");
        assert!(matches!(args.command, Command::Leads(LeadsCommand::Clear { yes: true })));
    }

    #[test]
    fn cli_rejects_unknown_status() {
        assert!(Args::try_parse_from(["crm", "leads", "status", "3", "maybe"]).is_err());
    }
}
