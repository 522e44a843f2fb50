//! Handlers for each `civic` subcommand.

use civic_navigator::api::types::{
  ArticleQuery, Incident, IncidentQuery, NewIncident, Submission, UserQuery,
};
use civic_navigator::queue::QueuedRequest;
use civic_navigator::{CivicClient, Config, LoginRedirect};
use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::{
  CacheCommand, Command, ExportCommand, IncidentCommand, KbCommand, QueueCommand, UsersCommand,
};

/// Tells the user to sign in again when the backend rejects the session.
pub struct CliRedirect;

impl LoginRedirect for CliRedirect {
  fn redirect_to_login(&self) {
    warn!("Session rejected by backend");
    eprintln!("Your session has expired. Run `civic login` to sign in again.");
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
  pub json: bool,
}

impl Output {
  /// Print `value` as JSON, or with `text` otherwise.
  fn show<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      text(value);
    }
    Ok(())
  }
}

fn print_incident_line(incident: &Incident) {
  println!(
    "{:<12} {:<12} {:<7} {:<20} {}",
    incident.incident_id,
    incident.status.to_string(),
    incident.priority.to_string(),
    incident.category,
    incident.title
  );
}

fn print_incident(incident: &Incident) {
  println!("{}  {}", incident.incident_id, incident.title);
  println!("  status:    {}", incident.status);
  println!("  priority:  {}", incident.priority);
  println!("  category:  {}", incident.category);
  println!("  location:  {}", incident.location);
  if let Some(submitted) = incident.submitted_on {
    println!("  submitted: {}", submitted.format("%Y-%m-%d %H:%M"));
  }
  if let Some(updated) = incident.last_updated {
    println!("  updated:   {}", updated.format("%Y-%m-%d %H:%M"));
  }
  if let Some(assignee) = &incident.assigned_to {
    println!("  assigned:  {}", assignee);
  }
  if !incident.description.is_empty() {
    println!();
    println!("{}", incident.description);
  }
}

fn print_queued(entries: &[QueuedRequest]) {
  for entry in entries {
    println!(
      "{}  {} {} (attempts: {}{})",
      entry.id,
      entry.request.method,
      entry.request.path,
      entry.attempts,
      entry
        .last_error
        .as_deref()
        .map(|e| format!(", last error: {}", e))
        .unwrap_or_default()
    );
  }
}

fn report_submission<T>(submission: &Submission<T>, sent: impl FnOnce(&T)) {
  match submission {
    Submission::Sent(value) => sent(value),
    Submission::Queued(id) => {
      println!("Backend unreachable; saved as {} and will be sent when back online.", id)
    }
  }
}

pub async fn run(
  client: &Arc<CivicClient>,
  config: &Config,
  command: Command,
  out: Output,
) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let user = client.auth().login(&email, &password).await?;
      out.show(&user, |u| println!("Signed in as {} <{}> ({})", u.name, u.email, u.role))?;
    }

    Command::Register {
      name,
      email,
      password,
      role,
    } => {
      let registration = client.auth().register(&name, &email, &password, role).await?;
      out.show(&registration, |r| {
        println!(
          "{}",
          r.message
            .as_deref()
            .unwrap_or("Registration successful. You can now log in.")
        )
      })?;
    }

    Command::Logout => {
      client.auth().logout().await?;
      println!("Signed out.");
    }

    Command::Whoami => match client.auth().restore_session()? {
      Some(user) => out.show(&user, |u| {
        println!("{} <{}> ({})", u.name, u.email, u.role);
        if !client.auth().is_token_valid() {
          println!("The stored token has expired; the next request will ask you to log in.");
        }
      })?,
      None => println!("Not signed in."),
    },

    Command::ResetPassword { email } => {
      let message = client.auth().reset_password(&email).await?;
      println!(
        "{}",
        message.as_deref().unwrap_or("If the account exists, a reset email has been sent.")
      );
    }

    Command::Health => {
      let status = client.health_check().await;
      out.show(&status, |s| {
        let mark = |up: bool| if up { "up" } else { "DOWN" };
        println!("main api:   {}", mark(s.main_api));
        println!("ai api:     {}", mark(s.ai_api));
        println!("auth api:   {}", mark(s.auth_api));
        println!("ai health:  {}", mark(s.ai_health_api));
      })?;
    }

    Command::Info => {
      let info = client.config_info();
      out.show(&info, |i| {
        println!("api:         {}", i.base_url);
        println!("ai:          {}", i.ai_url);
        println!("token:       {}", if i.has_token { "present" } else { "none" });
        println!("token valid: {}", i.token_valid);
        if let Some(user) = &i.user {
          println!("user:        {} <{}> ({})", user.name, user.email, user.role);
        }
      })?;
    }

    Command::Incident(cmd) => run_incident(client, cmd, out).await?,

    Command::Chat { message, session } => {
      let reply = client.chat().send_message(&message, session.as_deref()).await?;
      out.show(&reply, |r| {
        println!("{}", r.message.content);
        for citation in &r.message.citations {
          match &citation.source_link {
            Some(link) => println!("  [{}] {}", citation.title, link),
            None => println!("  [{}]", citation.title),
          }
        }
        if let Some(session) = &r.session_id {
          println!("(session {})", session);
        }
      })?;
    }

    Command::Sessions => {
      let sessions = client.chat().sessions().await?;
      out.show(&sessions, |list| {
        for s in list {
          let when = s
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
          println!("{:<26} {:<16} {}", s.id, when, s.title);
        }
      })?;
    }

    Command::Kb(cmd) => run_kb(client, cmd, out).await?,

    Command::Users(UsersCommand::List { search, role, page }) => {
      let query = UserQuery {
        page,
        search,
        role,
        ..Default::default()
      };
      let users = client.users().list(&query).await?;
      out.show(&users, |p| {
        for u in &p.users {
          println!("{:<26} {:<8} {:<24} {}", u.id, u.role.to_string(), u.name, u.email);
        }
        println!(
          "page {}/{} ({} users)",
          p.pagination.current, p.pagination.pages, p.pagination.total
        );
      })?;
    }

    Command::Users(UsersCommand::Show { id }) => {
      let user = client.users().get(&id).await?;
      out.show(&user, |u| println!("{} <{}> ({})", u.name, u.email, u.role))?;
    }

    Command::Export(ExportCommand::Users { dir }) => {
      let path = client.users().export(&UserQuery::default(), &dir).await?;
      println!("Wrote {}", path.display());
    }

    Command::Export(ExportCommand::Analytics {
      kind,
      timeframe,
      dir,
    }) => {
      let path = client.analytics().export(&kind, &timeframe, &dir).await?;
      println!("Wrote {}", path.display());
    }

    Command::Stats => {
      let (users_api, chat_api, incidents_api, kb_api, analytics_api) = (
        client.users(),
        client.chat(),
        client.incidents(),
        client.kb(),
        client.analytics(),
      );
      let (users, chat, incidents, kb, system) = futures::join!(
        users_api.stats(),
        chat_api.stats(),
        incidents_api.stats("30d"),
        kb_api.stats(),
        analytics_api.system_metrics(),
      );
      let stats = serde_json::json!({
        "users": users,
        "chat": chat,
        "incidents": incidents,
        "kb": kb,
        "system": system,
      });
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Command::Queue(cmd) => run_queue(client, cmd, out).await?,

    Command::Cache(CacheCommand::Clear) => {
      let removed = client.cache().clear()?;
      println!("Removed {} cached entries.", removed);
    }

    Command::ClearLocalData => {
      client.clear_local_data()?;
      println!("Cleared stored session and cache.");
    }

    Command::Watch { interval } => {
      let interval =
        Duration::from_secs(interval.unwrap_or(config.queue.watch_interval_secs).max(1));
      println!(
        "Watching connectivity every {}s; press Ctrl-C to stop.",
        interval.as_secs()
      );
      let handle = client.spawn_connectivity_watch(interval);
      tokio::signal::ctrl_c().await?;
      handle.abort();
    }
  }

  Ok(())
}

async fn run_incident(client: &CivicClient, cmd: IncidentCommand, out: Output) -> Result<()> {
  let incidents = client.incidents();
  match cmd {
    IncidentCommand::Report(args) => {
      let report = NewIncident {
        title: args.title,
        description: args.description,
        category: args.category,
        location: args.location,
        priority: args.priority,
        email: args.email,
        ..Default::default()
      };
      let submission = incidents.create(&report).await?;
      report_submission(&submission, |incident| {
        println!("Reported {}. Keep this reference to check its status.", incident.incident_id)
      });
    }

    IncidentCommand::List {
      status,
      priority,
      category,
      search,
      page,
      limit,
    } => {
      let query = IncidentQuery {
        page,
        limit,
        search,
        category,
        status,
        priority,
        ..Default::default()
      };
      let page = incidents.list(&query).await?;
      out.show(&page, |p| {
        for incident in &p.incidents {
          print_incident_line(incident);
        }
        println!("page {}/{} ({} incidents)", p.current_page, p.total_pages, p.total);
      })?;
    }

    IncidentCommand::Show { id } => {
      let incident = incidents.get(&id).await?;
      out.show(&incident, print_incident)?;
    }

    IncidentCommand::Status { reference } => {
      let incident = incidents.check_status(&reference).await?;
      out.show(&incident, |i| println!("{}: {}", i.incident_id, i.status))?;
    }

    IncidentCommand::Update {
      id,
      status,
      notes,
      assign,
    } => {
      let submission = incidents
        .update_status(&id, status, notes.as_deref(), assign.as_deref())
        .await?;
      report_submission(&submission, |_| println!("Status set to {}.", status));
    }

    IncidentCommand::Comment { id, text } => {
      let submission = incidents.add_comment(&id, &text).await?;
      report_submission(&submission, |_| println!("Comment added."));
    }
  }
  Ok(())
}

async fn run_kb(client: &CivicClient, cmd: KbCommand, out: Output) -> Result<()> {
  let kb = client.kb();
  match cmd {
    KbCommand::List {
      status,
      category,
      search,
      page,
    } => {
      let query = ArticleQuery {
        page,
        search,
        status,
        category,
        ..Default::default()
      };
      let page = kb.articles(&query).await?;
      out.show(&page, |p| {
        for a in &p.articles {
          let status = a.status.map_or("-", |s| s.as_str());
          println!("{:<26} {:<10} {:<16} {}", a.id, status, a.category, a.title);
        }
      })?;
    }

    KbCommand::Search {
      query,
      category,
      limit,
    } => {
      let results = kb.search(&query, category.as_deref(), limit).await;
      out.show(&results, |r| {
        if r.results.is_empty() {
          println!("No articles match '{}'.", r.query);
        }
        for hit in &r.results {
          println!("{}", hit.title);
          if let Some(snippet) = hit.snippet.as_deref().or(hit.content.as_deref()) {
            println!("  {}", snippet.chars().take(160).collect::<String>());
          }
        }
      })?;
    }

    KbCommand::Popular { limit } => {
      let articles = kb.popular(limit).await;
      out.show(&articles, |list| {
        for a in list {
          println!("{:>6} views  {}", a.views, a.title);
        }
      })?;
    }

    KbCommand::Reindex => {
      let message = kb.reindex().await?;
      println!("{}", message.as_deref().unwrap_or("Reindex started."));
    }
  }
  Ok(())
}

async fn run_queue(client: &CivicClient, cmd: QueueCommand, out: Output) -> Result<()> {
  let queue = client.queue();
  match cmd {
    QueueCommand::Status => {
      let pending = queue.pending()?;
      let dead = queue.dead_letters()?;
      if out.json {
        let value = serde_json::json!({ "pending": pending, "deadLetter": dead });
        println!("{}", serde_json::to_string_pretty(&value)?);
      } else {
        println!("{} pending", pending.len());
        print_queued(&pending);
        if !dead.is_empty() {
          println!("{} dead-lettered", dead.len());
          print_queued(&dead);
        }
      }
    }

    QueueCommand::Drain => {
      let report = client.process_queue().await?;
      println!(
        "processed {}, dead-lettered {}, remaining {}",
        report.processed.len(),
        report.dead_lettered.len(),
        report.remaining
      );
    }

    QueueCommand::Clear => {
      queue.clear()?;
      println!("Queue cleared.");
    }

    QueueCommand::ClearDead => {
      queue.clear_dead_letters()?;
      println!("Dead-letter list cleared.");
    }
  }
  Ok(())
}
