use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use webclick_core::{ArchiveJob, JobId, JobState, Msg, PageCounts};
use webclick_engine::Engine;
use webclick_logging::webclick_warn;

use crate::session::Session;

/// Prints one level of children of `url`.
pub async fn links(engine: &Engine, url: &str) -> Result<()> {
    let links = engine
        .resolve_links(url)
        .await
        .with_context(|| format!("resolving links of {url}"))?;
    for link in &links {
        println!("{}\t{}", link.url, link.title);
    }
    println!("{} links", links.len());
    Ok(())
}

/// Archives `urls` and follows the job until it ends. Ctrl-C cancels it.
pub async fn archive(engine: &Engine, root: Option<String>, urls: &[String]) -> Result<()> {
    let root = match root {
        Some(root) => root,
        None => urls.first().cloned().unwrap_or_default(),
    };
    let job_id = engine
        .submit_archive(&root, urls)
        .context("submitting archive")?;
    let mut rx = engine.jobs().subscribe(job_id)?;
    println!("{job_id} submitted with {} pages", rx.borrow().pages.len());

    let mut last_line = String::new();
    let job = loop {
        let snapshot = rx.borrow_and_update().clone();
        let line = progress_line(&snapshot);
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
        if snapshot.is_terminal() {
            break snapshot;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break engine.jobs().status(job_id)?;
                }
            }
            interrupted = tokio::signal::ctrl_c() => {
                if let Err(err) = interrupted {
                    webclick_warn!("cannot listen for Ctrl-C: {err}");
                }
                println!("cancelling {job_id}");
                engine.jobs().cancel(job_id)?;
            }
        }
    };

    for page in job.pages.iter().filter(|page| page.error.is_some()) {
        println!(
            "  failed {} after {} attempts: {}",
            page.url,
            page.attempts,
            page.error.as_deref().unwrap_or_default()
        );
    }
    match job.state {
        JobState::Completed => {
            if let Some(path) = &job.result_artifact_path {
                println!("archive written to {}", path.display());
            }
            Ok(())
        }
        JobState::Cancelled => {
            println!("{job_id} cancelled");
            Ok(())
        }
        _ => bail!(
            "{job_id} failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn progress_line(job: &ArchiveJob) -> String {
    let PageCounts {
        pending,
        rendering,
        captured,
        failed,
    } = job.counts();
    format!(
        "{} {:>3}% {} | {captured} captured, {failed} failed, {rendering} rendering, {pending} pending",
        job.id, job.progress_percent, job.state
    )
}

const HELP: &str = "\
commands:
  ls            show the link tree
  expand N      load the links of row N
  collapse N    hide the children of row N
  select N      toggle row N for archiving
  archive       archive the selected pages
  jobs          show archive jobs
  cancel ID     cancel a running job (e.g. job-1)
  quit          leave";

/// Interactive exploration of the link tree rooted at `url`.
pub async fn explore(engine: Engine, url: &str) -> Result<()> {
    let mut session = Session::new(engine);
    session.dispatch(Msg::RootSubmitted(url.to_string()));
    if let Some(root) = session.view().rows.first().map(|row| row.node) {
        session.settle(root).await;
    }
    print_tree(&session);
    println!(
        "archives are written to {}",
        session.engine().config().output_dir.display()
    );
    println!("{HELP}");

    let mut shown_error: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        session.drain();
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let arg = words.next();
        match (command, arg) {
            ("ls", _) => print_tree(&session),
            ("expand", Some(n)) => match row_node(&session, n) {
                Some(node) => {
                    session.dispatch(Msg::ExpandClicked(node));
                    session.settle(node).await;
                    print_tree(&session);
                }
                None => println!("no row {n}"),
            },
            ("collapse", Some(n)) => match row_node(&session, n) {
                Some(node) => {
                    session.dispatch(Msg::CollapseClicked(node));
                    print_tree(&session);
                }
                None => println!("no row {n}"),
            },
            ("select", Some(n)) => match row_node(&session, n) {
                Some(node) => {
                    session.dispatch(Msg::SelectionToggled(node));
                    println!("{} selected", session.view().selected.len());
                }
                None => println!("no row {n}"),
            },
            ("archive", _) => {
                session.dispatch(Msg::ArchiveClicked);
                session.drain();
                print_jobs(&session);
            }
            ("jobs", _) => print_jobs(&session),
            ("cancel", Some(id)) => match id.parse::<JobId>() {
                Ok(job_id) => {
                    session.dispatch(Msg::CancelClicked(job_id));
                    session.drain();
                    print_jobs(&session);
                }
                Err(_) => println!("not a job id: {id}"),
            },
            ("quit" | "exit", _) => break,
            _ => println!("{HELP}"),
        }
        let error = session.view().last_error;
        if error.is_some() && error != shown_error {
            println!("error: {}", error.as_deref().unwrap_or_default());
        }
        shown_error = error;
    }
    Ok(())
}

fn row_node(session: &Session, raw: &str) -> Option<webclick_core::NodeId> {
    let index: usize = raw.parse().ok()?;
    session.view().rows.get(index).map(|row| row.node)
}

fn print_tree(session: &Session) {
    let view = session.view();
    for (index, row) in view.rows.iter().enumerate() {
        let marker = match (row.loading, row.expanded) {
            (true, _) => "…",
            (false, true) => "-",
            (false, false) => "+",
        };
        let selected = if row.selected { "*" } else { " " };
        println!(
            "{index:>4} {selected} {}{marker} {} <{}>",
            "  ".repeat(row.depth),
            row.title,
            row.url
        );
    }
}

fn print_jobs(session: &Session) {
    let view = session.view();
    if view.jobs.is_empty() {
        println!("no jobs");
    }
    for job in &view.jobs {
        let detail = match (&job.artifact, &job.error) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{} {:>3}% {} {}/{} captured, {} failed {detail}",
            job.job_id, job.progress_percent, job.state, job.captured, job.total, job.failed
        );
    }
}
