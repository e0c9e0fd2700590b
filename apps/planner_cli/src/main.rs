use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    DragPayload, DropOutcome, HttpPlannerBackend, NoticeSeverity, PlanEditor, PlanEvent,
    PlannerBackend,
};
use shared::domain::{BucketKey, CourseId, EntryId, PlanId, Term, UserId};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "planner", about = "Arrange courses across a four-year plan grid")]
struct Args {
    #[arg(long, env = "PLANNER_CONFIG", default_value = "planner.toml")]
    config: PathBuf,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List your plans, most recently updated first.
    Plans,
    /// Create a new, empty plan.
    CreatePlan {
        name: String,
        #[arg(long)]
        start_year: Option<i32>,
    },
    /// Print a plan's year and term grid.
    Show {
        plan: i64,
        /// Years to print collapsed.
        #[arg(long = "collapse")]
        collapsed: Vec<i32>,
    },
    /// Drop a catalog course into a year/term slot.
    Add {
        plan: i64,
        course: i64,
        year: i32,
        term: Term,
    },
    /// Drag a placed course to another year/term slot.
    Move {
        plan: i64,
        entry: i64,
        year: i32,
        term: Term,
    },
    /// Take a placed course out of the plan.
    Remove {
        plan: i64,
        entry: i64,
    },
    /// Give a plan a new name.
    Rename {
        plan: i64,
        name: String,
    },
    /// Catalog subjects whose code or name matches the query.
    Subjects {
        #[arg(default_value = "")]
        query: String,
    },
    /// Courses of one subject that are not yet in the plan.
    Courses {
        subject: String,
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        plan: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(v) = args.api_base.clone() {
        settings.api_base = v;
    }
    if let Some(v) = args.user.clone() {
        settings.user_id = Some(v);
    }
    if let Some(v) = args.timeout_secs {
        settings.request_timeout_secs = v;
    }

    let backend = Arc::new(
        HttpPlannerBackend::with_timeout(
            &settings.api_base,
            Duration::from_secs(settings.request_timeout_secs),
        )
        .context("failed to build backend client")?,
    );
    info!(api_base = backend.api_base(), "planner: using backend");

    let user = settings.user_id.as_deref().and_then(UserId::parse);
    if user.is_none() {
        warn!("no user id configured; plan commands will be refused");
    }
    let editor = PlanEditor::new(backend.clone(), user);
    let mut events = editor.subscribe_events();

    let result = run(args.command, &editor, backend.as_ref()).await;
    print_notices(&mut events);
    result
}

async fn run(command: Command, editor: &PlanEditor, backend: &HttpPlannerBackend) -> Result<()> {
    match command {
        Command::Plans => {
            editor.load_plans().await?;
            let text = editor.with_state(|state| render::render_plan_list(&state.plans)).await;
            print!("{text}");
        }
        Command::CreatePlan { name, start_year } => {
            let plan = editor.create_plan(&name, start_year).await?;
            println!("Created plan #{} \"{}\"", plan.id, plan.name);
        }
        Command::Show { plan, collapsed } => {
            open(editor, plan).await?;
            for year_index in collapsed {
                editor.toggle_year(year_index).await;
            }
            print_grid(editor).await;
        }
        Command::Add {
            plan,
            course,
            year,
            term,
        } => {
            open(editor, plan).await?;
            let found = backend
                .courses_by_ids(&[CourseId(course)])
                .await
                .context("failed to look up course")?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("course {course} does not exist"))?;
            let subject_code = editor
                .with_state(|state| state.subject_code_for(&found).map(str::to_string))
                .await;

            let target = BucketKey::new(year, term);
            editor
                .begin_drag(DragPayload::from_course(&found, subject_code.as_deref()))
                .await;
            editor.drag_over(target).await;
            report_drop(editor.drop_into(target).await?)?;
            print_grid(editor).await;
        }
        Command::Move {
            plan,
            entry,
            year,
            term,
        } => {
            open(editor, plan).await?;
            let target = BucketKey::new(year, term);
            editor.begin_entry_drag(EntryId::Persisted(entry)).await?;
            editor.drag_over(target).await;
            report_drop(editor.drop_into(target).await?)?;
            print_grid(editor).await;
        }
        Command::Remove { plan, entry } => {
            open(editor, plan).await?;
            editor.remove_entry(EntryId::Persisted(entry)).await?;
            print_grid(editor).await;
        }
        Command::Rename { plan, name } => {
            editor.load_plans().await?;
            editor.rename_plan(PlanId(plan), &name).await?;
            let text = editor.with_state(|state| render::render_plan_list(&state.plans)).await;
            print!("{text}");
        }
        Command::Subjects { query } => {
            editor.load_subjects().await?;
            editor.set_subject_query(&query).await;
            print!("{}", render::render_subjects(&editor.visible_subjects().await));
        }
        Command::Courses {
            subject,
            query,
            plan,
        } => {
            if let Some(plan) = plan {
                open(editor, plan).await?;
            } else {
                editor.load_subjects().await?;
            }
            let wanted = subject.trim().to_uppercase();
            let selected = editor
                .with_state(|state| {
                    state
                        .sidebar
                        .subjects
                        .iter()
                        .find(|subject| subject.code.to_uppercase() == wanted)
                        .cloned()
                })
                .await
                .ok_or_else(|| anyhow!("unknown subject '{subject}'"))?;
            let code = selected.code.clone();
            editor.select_subject(selected).await?;
            editor.set_search_query(&query).await;
            print!(
                "{}",
                render::render_courses(&editor.visible_courses().await, Some(&code))
            );
        }
    }
    Ok(())
}

/// Loads the catalog subjects (for labels) and opens `plan_id`.
async fn open(editor: &PlanEditor, plan_id: i64) -> Result<()> {
    if let Err(err) = editor.load_subjects().await {
        warn!("subject codes unavailable: {err}");
    }
    editor.load_plans().await?;
    editor.open_plan(PlanId(plan_id)).await?;
    Ok(())
}

fn report_drop(outcome: DropOutcome) -> Result<()> {
    match outcome {
        DropOutcome::Applied(outcome) => {
            info!(?outcome, "planner: drop applied");
            Ok(())
        }
        DropOutcome::Ignored(reason) => bail!("drop ignored: {reason:?}"),
    }
}

async fn print_grid(editor: &PlanEditor) {
    let text = editor.with_state(render::render_grid).await;
    print!("{text}");
}

fn print_notices(events: &mut broadcast::Receiver<PlanEvent>) {
    loop {
        match events.try_recv() {
            Ok(PlanEvent::Notice(notice)) => {
                let prefix = match notice.severity {
                    NoticeSeverity::Transient => "notice",
                    NoticeSeverity::Persistent => "error",
                };
                eprintln!("{prefix}: {}", notice.message);
            }
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
