//! Budget threshold alerts.
//!
//! Writes that change a month's spending or income publish an
//! [`AlertEvent`] once their transaction has committed. A background worker
//! evaluates each event with [`check_budget_alerts`] and sends at most one
//! e-mail per threshold, profile and month. The ledger's unique constraint
//! decides which of several concurrent checks sends the e-mail.

use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::date_utils::YearMonth;
use crate::db::queries::{alerts, profiles, users};
use crate::db::DbPool;
use crate::filters::{format_brl, format_percent};
use crate::services::budget::{month_budget, MonthBudget};
use crate::services::mailer::{Mailer, OutgoingMail};

pub const MAX_ALERT_ATTEMPTS: u32 = 3;

pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownUser,
    Disabled,
    NoBudget,
    BelowThresholds,
    HigherAlreadySent,
    AlreadySent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Sent { threshold: u32 },
    Skipped(SkipReason),
    /// The e-mail could not be sent; the ledger row was released.
    Failed { threshold: u32, error: String },
}

/// Highest threshold at or below `percent`, if any.
pub fn highest_crossed(thresholds: &[u32], percent: f64) -> Option<u32> {
    thresholds
        .iter()
        .copied()
        .filter(|t| *t as f64 <= percent)
        .max()
}

/// Evaluate the alert ladder for one user and month and send the e-mail
/// for the highest newly crossed threshold.
pub fn check_budget_alerts(
    conn: &Connection,
    mailer: &dyn Mailer,
    user_id: i64,
    month: YearMonth,
    site_url: &str,
) -> rusqlite::Result<AlertOutcome> {
    let Some(user) = users::get_user(conn, user_id)? else {
        return Ok(AlertOutcome::Skipped(SkipReason::UnknownUser));
    };
    let profile = profiles::get_or_create_profile(conn, user_id)?;
    if !profile.alerts_enabled {
        return Ok(AlertOutcome::Skipped(SkipReason::Disabled));
    }

    let budget = month_budget(conn, &profile, month)?;
    if budget.available_cents <= 0 {
        return Ok(AlertOutcome::Skipped(SkipReason::NoBudget));
    }

    alerts::prune_above(conn, profile.id, month.year, month.month, budget.percent_used)?;

    let Some(threshold) = highest_crossed(&profile.threshold_list(), budget.percent_used) else {
        return Ok(AlertOutcome::Skipped(SkipReason::BelowThresholds));
    };

    if alerts::exists_above(conn, profile.id, month.year, month.month, threshold)? {
        return Ok(AlertOutcome::Skipped(SkipReason::HigherAlreadySent));
    }

    if !alerts::claim(conn, profile.id, month.year, month.month, threshold)? {
        return Ok(AlertOutcome::Skipped(SkipReason::AlreadySent));
    }

    let sent = render_alert_email(&user.email, user.display_name(), month, threshold, &budget, site_url)
        .map_err(|e| e.to_string())
        .and_then(|mail| mailer.send(&mail).map_err(|e| e.to_string()));

    match sent {
        Ok(()) => {
            info!(user_id, %month, threshold, "Budget alert sent");
            Ok(AlertOutcome::Sent { threshold })
        }
        Err(err) => {
            warn!(user_id, %month, threshold, error = %err, "Budget alert failed, releasing ledger entry");
            alerts::release(conn, profile.id, month.year, month.month, threshold)?;
            Ok(AlertOutcome::Failed {
                threshold,
                error: err,
            })
        }
    }
}

/// Wording and colour of an alert, by threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTier {
    pub title: &'static str,
    pub color: &'static str,
    pub message: &'static str,
    pub tips: &'static [&'static str],
}

pub fn tier_for(threshold: u32) -> AlertTier {
    match threshold {
        0..=50 => AlertTier {
            title: "Tudo sob controle!",
            color: "#16a34a",
            message: "Você já usou metade do orçamento do mês, mas ainda está no caminho certo.",
            tips: &[
                "Continue registrando todas as despesas.",
                "Revise as assinaturas que você não usa.",
            ],
        },
        51..=75 => AlertTier {
            title: "Sinal de Atenção",
            color: "#ca8a04",
            message: "Boa parte do orçamento já foi utilizada. Vale a pena desacelerar.",
            tips: &[
                "Priorize gastos essenciais até o fim do mês.",
                "Adie compras por impulso.",
            ],
        },
        76..=99 => AlertTier {
            title: "Zona de Risco!",
            color: "#ea580c",
            message: "Você está perto do limite do orçamento deste mês.",
            tips: &[
                "Evite novas despesas variáveis.",
                "Confira se há parcelas futuras comprometendo o próximo mês.",
            ],
        },
        _ => AlertTier {
            title: "Orçamento Estourado!",
            color: "#dc2626",
            message: "Os gastos do mês alcançaram ou passaram do orçamento disponível.",
            tips: &[
                "Revise as despesas por categoria no painel.",
                "Planeje cortes para equilibrar o próximo mês.",
            ],
        },
    }
}

#[derive(Template)]
#[template(path = "emails/budget_alert.html")]
struct BudgetAlertHtml<'a> {
    name: &'a str,
    tier: AlertTier,
    threshold: u32,
    month_label: String,
    available: String,
    spent: String,
    balance: String,
    percent: String,
    bar_width: u32,
    link: String,
}

#[derive(Template)]
#[template(path = "emails/budget_alert.txt")]
struct BudgetAlertText<'a> {
    name: &'a str,
    tier: AlertTier,
    threshold: u32,
    month_label: String,
    available: String,
    spent: String,
    balance: String,
    percent: String,
    link: String,
}

pub fn render_alert_email(
    to: &str,
    name: &str,
    month: YearMonth,
    threshold: u32,
    budget: &MonthBudget,
    site_url: &str,
) -> askama::Result<OutgoingMail> {
    let tier = tier_for(threshold);
    let link = format!(
        "{}/expenses?month={}&year={}",
        site_url.trim_end_matches('/'),
        month.month,
        month.year
    );
    let available = format_brl(budget.available_cents);
    let spent = format_brl(budget.expenses_cents);
    let balance = format_brl(budget.available_cents - budget.expenses_cents);
    let percent = format_percent(budget.percent_used);

    let html = BudgetAlertHtml {
        name,
        tier,
        threshold,
        month_label: month.long_label(),
        available: available.clone(),
        spent: spent.clone(),
        balance: balance.clone(),
        percent: percent.clone(),
        bar_width: budget.percent_used.clamp(0.0, 100.0).round() as u32,
        link: link.clone(),
    }
    .render()?;

    let text = BudgetAlertText {
        name,
        tier,
        threshold,
        month_label: month.long_label(),
        available,
        spent,
        balance,
        percent,
        link,
    }
    .render()?;

    Ok(OutgoingMail {
        to: to.to_string(),
        subject: format!(
            "[BpCash] Alerta: {}% do orçamento de {}",
            threshold,
            month.month_name()
        ),
        html,
        text,
    })
}

/// A request to re-evaluate alerts for one user and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEvent {
    pub user_id: i64,
    pub month: YearMonth,
}

/// Sending half of the alert queue, cloned into application state.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl AlertDispatcher {
    /// Queue a check. Call only after the triggering write has committed.
    pub fn publish(&self, user_id: i64, month: YearMonth) {
        let event = AlertEvent { user_id, month };
        if self.tx.send(event).is_err() {
            warn!(user_id, %month, "Alert worker is not running, dropping event");
        } else {
            debug!(user_id, %month, "Queued budget alert check");
        }
    }

    /// A dispatcher and the receiving end of its queue.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Start the worker that drains alert events.
pub fn spawn_worker(
    db: DbPool,
    mailer: Arc<dyn Mailer>,
    site_url: String,
    retry_delay: Duration,
) -> (AlertDispatcher, JoinHandle<()>) {
    let (dispatcher, mut rx) = AlertDispatcher::detached();

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tokio::spawn(run_with_retries(
                db.clone(),
                mailer.clone(),
                site_url.clone(),
                event,
                retry_delay,
            ));
        }
        debug!("Alert worker stopped");
    });

    (dispatcher, handle)
}

/// Run one check, retrying failed sends with exponential backoff.
pub async fn run_with_retries(
    db: DbPool,
    mailer: Arc<dyn Mailer>,
    site_url: String,
    event: AlertEvent,
    retry_delay: Duration,
) -> Option<AlertOutcome> {
    for attempt in 1..=MAX_ALERT_ATTEMPTS {
        let db = db.clone();
        let mailer = mailer.clone();
        let site_url = site_url.clone();

        let result = tokio::task::spawn_blocking(move || {
            let conn = db.get().map_err(|e| e.to_string())?;
            check_budget_alerts(&conn, mailer.as_ref(), event.user_id, event.month, &site_url)
                .map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(AlertOutcome::Failed { threshold, error })) if attempt < MAX_ALERT_ATTEMPTS => {
                let delay = retry_delay * 2u32.pow(attempt - 1);
                warn!(
                    user_id = event.user_id,
                    threshold,
                    attempt,
                    error = %error,
                    "Retrying budget alert in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Ok(Ok(outcome)) => {
                debug!(user_id = event.user_id, month = %event.month, ?outcome, "Budget alert check done");
                return Some(outcome);
            }
            Ok(Err(err)) => {
                error!(user_id = event.user_id, error = %err, "Budget alert check failed");
                return None;
            }
            Err(err) => {
                error!(user_id = event.user_id, error = %err, "Budget alert task panicked");
                return None;
            }
        }
    }
    None
}
