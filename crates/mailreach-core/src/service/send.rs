//! Campaign dispatch orchestration.
//!
//! One entry point, [`SendOrchestrator::send`], routes a request through
//! the schedule branches: test-address override, draft persistence,
//! future scheduling, timezone-window intent, and immediate dispatch.
//! Immediate dispatch resolves recipients, writes durable per-recipient
//! send records, fans the work out over a bounded worker pool, and
//! finalizes the campaign row with the aggregate result.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::audience::{Audience, AudienceId, AudienceRepository};
use crate::campaign::{
    CampaignId, CampaignRepository, CampaignStatus, NewCampaign, SendId,
};
use crate::content::{ContentGenerator, EmailElement, TrackingContext};
use crate::error::{Error, Result};
use crate::service::limiter::TokenBucket;
use crate::service::resolver::{AudienceResolver, ResolutionMode};
use crate::subscriber::{Subscriber, SubscriberId, SubscriberStatus};
use crate::transport::{EmailTransport, OutboundEmail};

/// Minimum lead time for a scheduled release.
const SCHEDULE_BUFFER: ChronoDuration = ChronoDuration::seconds(60);

/// Restricts who a non-production deployment may email.
///
/// When enabled, sends are rejected outright unless every targeted
/// audience name matches a test-audience pattern, and individual
/// recipients outside the address allow-list are silently skipped.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Whether the gate is active.
    pub enabled: bool,
    /// Addresses that may receive mail while the gate is active.
    pub allowed_emails: Vec<String>,
    /// Case-insensitive substrings identifying test audiences.
    pub test_audience_names: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_emails: Vec::new(),
            test_audience_names: vec!["test".to_string()],
        }
    }
}

impl SafetyConfig {
    /// A disabled gate, for production deployments.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            allowed_emails: Vec::new(),
            test_audience_names: Vec::new(),
        }
    }

    /// Whether the gate permits mailing `email`.
    #[must_use]
    pub fn allows_email(&self, email: &str) -> bool {
        !self.enabled
            || self
                .allowed_emails
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(email))
    }

    /// Whether `name` names a test audience.
    #[must_use]
    pub fn is_test_audience(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.test_audience_names
            .iter()
            .any(|pattern| name.contains(&pattern.to_lowercase()))
    }
}

/// Dispatch configuration: identity, safety, and throughput knobs.
#[derive(Debug, Clone)]
pub struct SendConfig {
    /// Safety gate for non-production deployments.
    pub safety: SafetyConfig,
    /// Sender display name.
    pub sender_name: String,
    /// Sender address.
    pub sender_email: String,
    /// Number of concurrent dispatch workers.
    pub workers: usize,
    /// Optional transport rate cap, in sends per second.
    pub rate_per_second: Option<u32>,
    /// Per-recipient transport deadline.
    pub send_timeout: Duration,
    /// Optional deadline for a whole dispatch run; on expiry, remaining
    /// recipients are cancelled and recorded as failed.
    pub run_timeout: Option<Duration>,
}

impl SendConfig {
    /// Creates a config with default throughput knobs and the safety gate
    /// enabled.
    #[must_use]
    pub fn new(sender_name: impl Into<String>, sender_email: impl Into<String>) -> Self {
        Self {
            safety: SafetyConfig::default(),
            sender_name: sender_name.into(),
            sender_email: sender_email.into(),
            workers: 8,
            rate_per_second: None,
            send_timeout: Duration::from_secs(30),
            run_timeout: None,
        }
    }

    /// Sets the safety gate.
    #[must_use]
    pub fn safety(mut self, safety: SafetyConfig) -> Self {
        self.safety = safety;
        self
    }

    /// Sets the worker-pool size.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the per-second rate cap.
    #[must_use]
    pub const fn rate_per_second(mut self, rate: u32) -> Self {
        self.rate_per_second = Some(rate);
        self
    }

    /// Sets the per-recipient transport deadline.
    #[must_use]
    pub const fn send_timeout(mut self, deadline: Duration) -> Self {
        self.send_timeout = deadline;
        self
    }

    /// Sets the whole-run deadline.
    #[must_use]
    pub const fn run_timeout(mut self, deadline: Duration) -> Self {
        self.run_timeout = Some(deadline);
        self
    }
}

/// When the campaign should go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleType {
    /// Dispatch now.
    Immediate,
    /// Dispatch at a fixed future instant (UTC date and time strings).
    Scheduled {
        /// `YYYY-MM-DD`.
        date: String,
        /// `HH:MM`.
        time: String,
    },
    /// Record the intent to release across a delivery window anchored at a
    /// local send time.
    Timezone {
        /// `HH:MM` local target.
        send_time: String,
        /// Window width in hours; values other than 6, 12 or 24 are
        /// widened to 24.
        window_hours: u8,
    },
    /// Persist without sending.
    Draft,
}

/// A campaign send request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Internal campaign name.
    pub name: String,
    /// Subject line (personalization variables allowed).
    pub subject: String,
    /// Inbox preview text.
    pub preheader: Option<String>,
    /// Structured body content.
    pub elements: Vec<EmailElement>,
    /// Audiences to include.
    pub audience_ids: Vec<AudienceId>,
    /// Audiences to subtract.
    pub excluded_audience_ids: Vec<AudienceId>,
    /// Release plan.
    pub schedule: ScheduleType,
    /// Existing campaign row to operate on, when the campaign was saved
    /// before sending.
    pub campaign_id: Option<CampaignId>,
    /// When set, overrides everything else: one message to this address,
    /// no recipient resolution, no durable records.
    pub test_email: Option<String>,
}

/// Aggregate counts for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Sends the transport accepted.
    pub sent: usize,
    /// Sends that failed, timed out, or were cancelled.
    pub failed: usize,
    /// Recipients targeted.
    pub total: usize,
}

/// Per-recipient outcome of a dispatch run.
#[derive(Debug, Clone)]
pub struct RecipientResult {
    /// Recipient address.
    pub email: String,
    /// The durable send record.
    pub send_id: SendId,
    /// Failure message, if the send did not go out.
    pub error: Option<String>,
}

/// What the orchestrator did with a request.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Persisted as a draft.
    Draft {
        /// The campaign row.
        campaign_id: CampaignId,
    },
    /// Scheduled for a future release.
    Scheduled {
        /// The campaign row.
        campaign_id: CampaignId,
        /// When it will go out.
        scheduled_for: DateTime<Utc>,
    },
    /// Timezone-window intent recorded; nothing dispatched yet.
    TimezoneWindow {
        /// The campaign row, when one was saved.
        campaign_id: Option<CampaignId>,
        /// Local target time.
        send_time: String,
        /// Normalized window width in hours.
        window_hours: u8,
        /// Earliest release instant.
        estimated_start: DateTime<Utc>,
        /// Latest release instant.
        estimated_completion: DateTime<Utc>,
    },
    /// A single test message went out.
    TestSent {
        /// Where it went.
        recipient: String,
    },
    /// An immediate dispatch run finished.
    Completed {
        /// The campaign row.
        campaign_id: CampaignId,
        /// Aggregate counts.
        stats: DispatchStats,
        /// Per-recipient outcomes.
        results: Vec<RecipientResult>,
    },
}

/// Cooperative cancellation for a dispatch run.
///
/// Cancelling stops workers from starting new recipients; in-flight
/// transport calls run to their own deadline. Cancelled recipients are
/// recorded as failed, never left pending.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct DispatchJob {
    send_id: SendId,
    subscriber: Subscriber,
}

struct WorkerResult {
    send_id: SendId,
    email: String,
    error: Option<String>,
    tracked_html: Option<String>,
}

/// Everything a worker needs to render one recipient's message.
struct RenderContext {
    campaign_id: CampaignId,
    subject: String,
    preheader: Option<String>,
    elements: Vec<EmailElement>,
    from: String,
}

/// Routes send requests through the schedule branches and runs immediate
/// dispatch.
pub struct SendOrchestrator<T: EmailTransport + 'static> {
    transport: Arc<T>,
    resolver: AudienceResolver,
    audiences: Arc<AudienceRepository>,
    campaigns: Arc<CampaignRepository>,
    generator: Arc<dyn ContentGenerator>,
    config: SendConfig,
}

impl<T: EmailTransport + 'static> SendOrchestrator<T> {
    /// Creates an orchestrator.
    pub fn new(
        transport: Arc<T>,
        resolver: AudienceResolver,
        audiences: Arc<AudienceRepository>,
        campaigns: Arc<CampaignRepository>,
        generator: Arc<dyn ContentGenerator>,
        config: SendConfig,
    ) -> Self {
        Self {
            transport,
            resolver,
            audiences,
            campaigns,
            generator,
            config,
        }
    }

    /// Process a send request with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Returns an error when validation, scheduling, the safety gate, or
    /// recipient resolution rejects the request, or when campaign
    /// bookkeeping fails. Per-recipient transport failures are not errors;
    /// they are reported in [`SendOutcome::Completed`].
    pub async fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        self.send_with_cancel(request, &CancelToken::new()).await
    }

    /// Process a send request under an external cancellation token.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn send_with_cancel(
        &self,
        request: SendRequest,
        cancel: &CancelToken,
    ) -> Result<SendOutcome> {
        // The test override comes before everything else so a broken
        // request can still be exercised against a real inbox.
        if let Some(test_email) = request.test_email.clone() {
            return self.send_test(&request, &test_email).await;
        }

        if request.subject.trim().is_empty() {
            return Err(Error::Validation("subject must not be empty".to_string()));
        }
        if request.elements.is_empty() {
            return Err(Error::Validation(
                "campaign content must not be empty".to_string(),
            ));
        }

        match request.schedule.clone() {
            ScheduleType::Draft => self.save_draft(&request).await,
            ScheduleType::Scheduled { date, time } => {
                self.schedule(&request, &date, &time).await
            }
            ScheduleType::Timezone {
                send_time,
                window_hours,
            } => self.record_timezone_window(&request, &send_time, window_hours).await,
            ScheduleType::Immediate => self.dispatch(&request, cancel).await,
        }
    }

    /// Send one test message, bypassing recipient resolution.
    async fn send_test(&self, request: &SendRequest, test_email: &str) -> Result<SendOutcome> {
        if !is_valid_email(test_email) {
            return Err(Error::Validation(format!(
                "invalid test email address: {test_email}"
            )));
        }
        if !self.config.safety.allows_email(test_email) {
            return Err(Error::Validation(format!(
                "safety mode does not allow sending to {test_email}"
            )));
        }

        let recipient = Subscriber {
            id: SubscriberId(0),
            email: test_email.to_string(),
            status: SubscriberStatus::Active,
            profile_id: None,
            first_name: None,
            last_name: None,
            subscribe_date: Utc::now(),
        };

        // A draft placeholder gives the tracked links a real campaign id.
        // Best-effort: a failed write downgrades to untracked content
        // rather than blocking the test send.
        let campaign_id = match request.campaign_id {
            Some(id) => Some(id),
            None => {
                let (base_html, base_text) = self.render_base(request);
                let mut new = NewCampaign::new(
                    &request.name,
                    &request.subject,
                    &self.config.sender_name,
                    &self.config.sender_email,
                )
                .content(base_html, base_text);
                if let Some(preheader) = &request.preheader {
                    new = new.preheader(preheader);
                }
                match self.campaigns.create(&new).await {
                    Ok(id) => Some(id),
                    Err(error) => {
                        warn!(%error, "could not create placeholder campaign for test send");
                        None
                    }
                }
            }
        };

        let tracking = campaign_id.map(|campaign_id| TrackingContext {
            campaign_id,
            subscriber_id: recipient.id,
            send_id: SendId(0),
        });
        let html = self.generator.html(
            &request.elements,
            &request.subject,
            request.preheader.as_deref(),
            tracking.as_ref(),
        );
        let subject = if request.subject.starts_with("[TEST]") {
            request.subject.clone()
        } else {
            format!("[TEST] {}", request.subject)
        };
        let email = OutboundEmail {
            to: test_email.to_string(),
            subject: self.generator.personalize(&subject, &recipient),
            html: self.generator.personalize(&html, &recipient),
            text: self
                .generator
                .personalize(&self.generator.text(&request.elements), &recipient),
            from: self.from_header(),
        };

        let outcome = timeout(self.config.send_timeout, self.transport.send_email(email))
            .await
            .map_err(|_| Error::Transport("test send timed out".to_string()))?;
        outcome.map_err(|error| Error::Transport(error.to_string()))?;

        info!(recipient = test_email, "test email sent");
        Ok(SendOutcome::TestSent {
            recipient: test_email.to_string(),
        })
    }

    /// Persist the campaign as a draft without sending.
    async fn save_draft(&self, request: &SendRequest) -> Result<SendOutcome> {
        let campaign_id = match request.campaign_id {
            Some(id) => {
                self.require_campaign(id).await?;
                id
            }
            None => {
                let (html, text) = self.render_base(request);
                let mut new = NewCampaign::new(
                    &request.name,
                    &request.subject,
                    &self.config.sender_name,
                    &self.config.sender_email,
                )
                .content(html, text);
                if let Some(preheader) = &request.preheader {
                    new = new.preheader(preheader);
                }
                self.campaigns.create(&new).await?
            }
        };

        self.link_audiences(campaign_id, request).await?;
        debug!(campaign = campaign_id.0, "campaign saved as draft");
        Ok(SendOutcome::Draft { campaign_id })
    }

    /// Schedule a saved campaign for a future release.
    async fn schedule(
        &self,
        request: &SendRequest,
        date: &str,
        time: &str,
    ) -> Result<SendOutcome> {
        let Some(campaign_id) = request.campaign_id else {
            return Err(Error::Schedule(
                "scheduling requires a saved campaign".to_string(),
            ));
        };
        let campaign = self.require_campaign(campaign_id).await?;

        // A release time persisted with the campaign wins over the
        // request's date and time strings.
        let scheduled_for = match campaign.scheduled_at {
            Some(at) => at,
            None => parse_schedule(date, time)?,
        };

        if scheduled_for < Utc::now() + SCHEDULE_BUFFER {
            return Err(Error::Schedule(
                "scheduled time must be at least one minute in the future".to_string(),
            ));
        }

        self.link_audiences(campaign_id, request).await?;
        self.campaigns.set_schedule(campaign_id, scheduled_for).await?;
        info!(
            campaign = campaign_id.0,
            %scheduled_for,
            "campaign scheduled"
        );
        Ok(SendOutcome::Scheduled {
            campaign_id,
            scheduled_for,
        })
    }

    /// Record a timezone-window release intent without dispatching.
    async fn record_timezone_window(
        &self,
        request: &SendRequest,
        send_time: &str,
        window_hours: u8,
    ) -> Result<SendOutcome> {
        let target = NaiveTime::parse_from_str(send_time, "%H:%M").map_err(|_| {
            Error::Schedule(format!("invalid send time: {send_time}"))
        })?;
        let window_hours = match window_hours {
            6 | 12 | 24 => window_hours,
            _ => 24,
        };

        let now = Utc::now();
        let mut estimated_start = now
            .date_naive()
            .and_time(target)
            .and_utc();
        if estimated_start <= now {
            estimated_start += ChronoDuration::days(1);
        }
        let estimated_completion = estimated_start + ChronoDuration::hours(i64::from(window_hours));

        // Intent only: the campaign never enters the scheduled state, so
        // the one-shot scheduler query cannot pick it up and dispatch it.
        if let Some(campaign_id) = request.campaign_id {
            self.require_campaign(campaign_id).await?;
            self.link_audiences(campaign_id, request).await?;
        }

        info!(
            send_time,
            window_hours,
            %estimated_start,
            "timezone-window release recorded"
        );
        Ok(SendOutcome::TimezoneWindow {
            campaign_id: request.campaign_id,
            send_time: send_time.to_string(),
            window_hours,
            estimated_start,
            estimated_completion,
        })
    }

    /// Resolve recipients and dispatch immediately.
    async fn dispatch(&self, request: &SendRequest, cancel: &CancelToken) -> Result<SendOutcome> {
        if request.audience_ids.is_empty() {
            return Err(Error::Validation(
                "at least one audience is required".to_string(),
            ));
        }

        let included = self.audiences.list_by_ids(&request.audience_ids).await?;

        // The safety gate rejects before any row is written, and the error
        // names every offending audience.
        if self.config.safety.enabled {
            let blocked: Vec<String> = included
                .iter()
                .filter(|audience| !self.config.safety.is_test_audience(&audience.name))
                .map(|audience| audience.name.clone())
                .collect();
            if !blocked.is_empty() {
                return Err(Error::SafetyBlock { audiences: blocked });
            }
        }

        let recipients = self.resolve_recipients(&included, &request.excluded_audience_ids).await?;
        if recipients.is_empty() {
            return Err(Error::NoRecipients {
                safety_mode: self.config.safety.enabled,
            });
        }
        if self.config.safety.enabled
            && recipients
                .iter()
                .any(|sub| !self.config.safety.allows_email(&sub.email))
        {
            return Err(Error::Validation(
                "refusing to dispatch: a resolved recipient is outside the safety allow-list"
                    .to_string(),
            ));
        }

        let campaign_id = self.materialize_campaign(request).await?;
        self.link_audiences(campaign_id, request).await?;

        // Durable bookkeeping first: every targeted recipient gets a
        // pending row before any transport call.
        let mut jobs = Vec::with_capacity(recipients.len());
        for subscriber in recipients {
            let send_id = self
                .campaigns
                .create_send(campaign_id, subscriber.id, &subscriber.email)
                .await?;
            jobs.push(DispatchJob {
                send_id,
                subscriber,
            });
        }
        let total = jobs.len();

        info!(
            campaign = campaign_id.0,
            recipients = total,
            workers = self.config.workers,
            "dispatch started"
        );

        let context = Arc::new(RenderContext {
            campaign_id,
            subject: request.subject.clone(),
            preheader: request.preheader.clone(),
            elements: request.elements.clone(),
            from: self.from_header(),
        });
        let (results, snapshot) = self.run_workers(jobs, context, cancel.clone()).await;

        let sent = results.iter().filter(|r| r.error.is_none()).count();
        let stats = DispatchStats {
            sent,
            failed: total - sent,
            total,
        };

        let (status, sent_at) = if sent > 0 {
            (CampaignStatus::Sent, Some(Utc::now()))
        } else {
            (CampaignStatus::Draft, None)
        };
        self.campaigns
            .finalize(
                campaign_id,
                status,
                i64::try_from(sent).unwrap_or(i64::MAX),
                i64::try_from(total).unwrap_or(i64::MAX),
                sent_at,
                snapshot.as_deref(),
            )
            .await?;

        info!(
            campaign = campaign_id.0,
            sent = stats.sent,
            failed = stats.failed,
            "dispatch finished"
        );
        Ok(SendOutcome::Completed {
            campaign_id,
            stats,
            results,
        })
    }

    /// Build the deduplicated recipient list: union of included audiences,
    /// minus excluded audiences, minus unsendable statuses.
    async fn resolve_recipients(
        &self,
        included: &[Audience],
        excluded_ids: &[AudienceId],
    ) -> Result<Vec<Subscriber>> {
        let mut recipients: HashMap<SubscriberId, Subscriber> = HashMap::new();

        for audience in included {
            let resolved = self
                .resolver
                .resolve_subscribers(audience, ResolutionMode::Strict)
                .await;
            if resolved.degraded {
                warn!(
                    audience = audience.id.0,
                    "audience resolved in degraded mode, its members are omitted"
                );
            }
            for subscriber in resolved.subscribers {
                if matches!(
                    subscriber.status,
                    SubscriberStatus::Unsubscribed | SubscriberStatus::Bounced
                ) {
                    continue;
                }
                if !self.config.safety.allows_email(&subscriber.email) {
                    debug!(email = %subscriber.email, "skipped by safety allow-list");
                    continue;
                }
                recipients.entry(subscriber.id).or_insert(subscriber);
            }
        }

        let excluded = self.audiences.list_by_ids(excluded_ids).await?;
        for audience in &excluded {
            let resolved = self
                .resolver
                .resolve_member_ids(audience, ResolutionMode::Strict)
                .await;
            for id in resolved.ids {
                recipients.remove(&id);
            }
        }

        Ok(recipients.into_values().collect())
    }

    /// Fan jobs out over the worker pool and collect per-recipient results
    /// plus one representative tracked HTML body.
    async fn run_workers(
        &self,
        jobs: Vec<DispatchJob>,
        context: Arc<RenderContext>,
        cancel: CancelToken,
    ) -> (Vec<RecipientResult>, Option<String>) {
        let worker_count = self.config.workers.clamp(1, jobs.len().max(1));
        let queue = Arc::new(StdMutex::new(VecDeque::from(jobs)));
        let limiter = self
            .config
            .rate_per_second
            .map(|rate| Arc::new(TokenBucket::new(rate)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let watchdog = self.config.run_timeout.map(|limit| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("dispatch run deadline reached, cancelling remaining sends");
                cancel.cancel();
            })
        });

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            handles.push(tokio::spawn(Self::worker_loop(
                Arc::clone(&self.transport),
                Arc::clone(&self.campaigns),
                Arc::clone(&self.generator),
                limiter.clone(),
                Arc::clone(&queue),
                Arc::clone(&context),
                cancel.clone(),
                self.config.send_timeout,
                tx.clone(),
            )));
        }
        drop(tx);

        let mut results = Vec::new();
        let mut snapshot: Option<String> = None;
        while let Some(result) = rx.recv().await {
            if snapshot.is_none() {
                snapshot.clone_from(&result.tracked_html);
            }
            results.push(RecipientResult {
                email: result.email,
                send_id: result.send_id,
                error: result.error,
            });
        }
        for handle in handles {
            let _ = handle.await;
        }
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        (results, snapshot)
    }

    /// One worker: pull jobs until the queue drains or the run is
    /// cancelled; every pulled job ends as a sent or failed record.
    #[allow(clippy::too_many_arguments)]
    async fn worker_loop(
        transport: Arc<T>,
        campaigns: Arc<CampaignRepository>,
        generator: Arc<dyn ContentGenerator>,
        limiter: Option<Arc<TokenBucket>>,
        queue: Arc<StdMutex<VecDeque<DispatchJob>>>,
        context: Arc<RenderContext>,
        cancel: CancelToken,
        send_timeout: Duration,
        tx: mpsc::UnboundedSender<WorkerResult>,
    ) {
        loop {
            let job = match queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => break,
            };
            let Some(job) = job else { break };

            if cancel.is_cancelled() {
                let message = "cancelled before dispatch";
                if let Err(error) = campaigns.mark_send_failed(job.send_id, message).await {
                    warn!(send = job.send_id.0, %error, "failed to record cancellation");
                }
                let _ = tx.send(WorkerResult {
                    send_id: job.send_id,
                    email: job.subscriber.email,
                    error: Some(message.to_string()),
                    tracked_html: None,
                });
                continue;
            }

            let tracking = TrackingContext {
                campaign_id: context.campaign_id,
                subscriber_id: job.subscriber.id,
                send_id: job.send_id,
            };
            let html = generator.personalize(
                &generator.html(
                    &context.elements,
                    &context.subject,
                    context.preheader.as_deref(),
                    Some(&tracking),
                ),
                &job.subscriber,
            );
            let email = OutboundEmail {
                to: job.subscriber.email.clone(),
                subject: generator.personalize(&context.subject, &job.subscriber),
                html: html.clone(),
                text: generator.personalize(&generator.text(&context.elements), &job.subscriber),
                from: context.from.clone(),
            };

            if let Some(limiter) = &limiter {
                limiter.acquire().await;
            }

            let (error, tracked_html) =
                match timeout(send_timeout, transport.send_email(email)).await {
                    Ok(Ok(receipt)) => {
                        let marked = campaigns
                            .mark_send_sent(job.send_id, &receipt.message_id, Utc::now())
                            .await;
                        if let Err(error) = marked {
                            warn!(send = job.send_id.0, %error, "failed to record delivery");
                        }
                        (None, Some(html))
                    }
                    Ok(Err(error)) => (Some(error.to_string()), None),
                    Err(_) => (Some("send timed out".to_string()), None),
                };

            if let Some(message) = &error {
                debug!(email = %job.subscriber.email, error = %message, "send failed");
                if let Err(error) = campaigns.mark_send_failed(job.send_id, message).await {
                    warn!(send = job.send_id.0, %error, "failed to record send failure");
                }
            }
            let _ = tx.send(WorkerResult {
                send_id: job.send_id,
                email: job.subscriber.email,
                error,
                tracked_html,
            });
        }
    }

    /// Ensure a campaign row exists for this run and mark it sending.
    async fn materialize_campaign(&self, request: &SendRequest) -> Result<CampaignId> {
        let campaign_id = match request.campaign_id {
            Some(id) => {
                self.require_campaign(id).await?;
                id
            }
            None => {
                let (html, text) = self.render_base(request);
                let mut new = NewCampaign::new(
                    &request.name,
                    &request.subject,
                    &self.config.sender_name,
                    &self.config.sender_email,
                )
                .content(html, text);
                if let Some(preheader) = &request.preheader {
                    new = new.preheader(preheader);
                }
                self.campaigns.create(&new).await?
            }
        };
        self.campaigns.mark_sending(campaign_id).await?;
        Ok(campaign_id)
    }

    async fn require_campaign(&self, id: CampaignId) -> Result<crate::campaign::Campaign> {
        self.campaigns.get(id).await?.ok_or_else(|| {
            Error::CampaignRecord(format!("campaign {id} does not exist"))
        })
    }

    async fn link_audiences(&self, campaign_id: CampaignId, request: &SendRequest) -> Result<()> {
        for id in &request.audience_ids {
            self.campaigns.link_audience(campaign_id, *id, false).await?;
        }
        for id in &request.excluded_audience_ids {
            self.campaigns.link_audience(campaign_id, *id, true).await?;
        }
        Ok(())
    }

    /// Render the untracked, unpersonalized bodies stored on the campaign
    /// row.
    fn render_base(&self, request: &SendRequest) -> (String, String) {
        let html = self.generator.html(
            &request.elements,
            &request.subject,
            request.preheader.as_deref(),
            None,
        );
        let text = self.generator.text(&request.elements);
        (html, text)
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.config.sender_name, self.config.sender_email)
    }
}

/// Parse `YYYY-MM-DD` and `HH:MM` strings into a UTC instant.
fn parse_schedule(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| Error::Schedule(format!("invalid schedule date: {date}")))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| Error::Schedule(format!("invalid schedule time: {time}")))?;
    Ok(date.and_time(time).and_utc())
}

/// Minimal mailbox shape check: local part, `@`, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audience::FilterSet;
    use crate::campaign::SendStatus;
    use crate::content::ElementGenerator;
    use crate::subscriber::NewSubscriber;
    use crate::test_support::{Stores, stores};
    use crate::transport::{DeliveryReceipt, TransportError};
    use std::future::Future;

    /// Transport double: records accepted messages, rejects configured
    /// addresses, and can stall to trigger timeouts.
    #[derive(Default)]
    struct MockTransport {
        sent: StdMutex<Vec<OutboundEmail>>,
        reject: Vec<String>,
        delay: Option<Duration>,
    }

    impl MockTransport {
        fn rejecting(addresses: &[&str]) -> Self {
            Self {
                reject: addresses.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn stalling(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<OutboundEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl EmailTransport for MockTransport {
        fn send_email(
            &self,
            email: OutboundEmail,
        ) -> impl Future<Output = std::result::Result<DeliveryReceipt, TransportError>> + Send
        {
            async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.reject.contains(&email.to) {
                    return Err(TransportError::Rejected("mailbox unavailable".to_string()));
                }
                let mut sent = self.sent.lock().unwrap();
                let message_id = format!("msg-{}", sent.len());
                sent.push(email);
                Ok(DeliveryReceipt { message_id })
            }
        }
    }

    fn orchestrator(
        stores: &Stores,
        transport: Arc<MockTransport>,
        config: SendConfig,
    ) -> SendOrchestrator<MockTransport> {
        let resolver = AudienceResolver::new(
            stores.subscribers.clone(),
            stores.audiences.clone(),
            stores.campaigns.clone(),
        );
        SendOrchestrator::new(
            transport,
            resolver,
            stores.audiences.clone(),
            stores.campaigns.clone(),
            Arc::new(ElementGenerator::new("https://mail.example.com")),
            config,
        )
    }

    fn open_config() -> SendConfig {
        SendConfig::new("The Team", "team@mail.example.com").safety(SafetyConfig::disabled())
    }

    fn request(schedule: ScheduleType, audiences: Vec<AudienceId>) -> SendRequest {
        SendRequest {
            name: "Launch".to_string(),
            subject: "Hello {{firstName}}".to_string(),
            preheader: Some("A word from us".to_string()),
            elements: vec![
                EmailElement::Header {
                    content: "Hello".to_string(),
                },
                EmailElement::Button {
                    content: "Read more".to_string(),
                    url: "https://blog.example.com/post".to_string(),
                },
            ],
            audience_ids: audiences,
            excluded_audience_ids: Vec::new(),
            schedule,
            campaign_id: None,
            test_email: None,
        }
    }

    async fn seeded_audience(stores: &Stores, name: &str, emails: &[&str]) -> Audience {
        let audience = stores
            .audiences
            .create(name, &FilterSet::static_set())
            .await
            .unwrap();
        for email in emails {
            let id = stores
                .subscribers
                .insert(&NewSubscriber::new(*email))
                .await
                .unwrap();
            stores.audiences.add_member(audience.id, id).await.unwrap();
        }
        audience
    }

    #[tokio::test]
    async fn test_draft_persists_without_sending() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;

        let outcome = orchestrator
            .send(request(ScheduleType::Draft, vec![audience.id]))
            .await
            .unwrap();

        let SendOutcome::Draft { campaign_id } = outcome else {
            panic!("expected draft outcome");
        };
        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert!(campaign.html_content.unwrap().contains("Read more"));
        assert!(transport.sent().is_empty());
        assert!(stores
            .campaigns
            .sends_for_campaign(campaign_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scheduling_requires_a_saved_campaign() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;

        let result = orchestrator
            .send(request(
                ScheduleType::Scheduled {
                    date: "2030-01-01".to_string(),
                    time: "09:00".to_string(),
                },
                vec![audience.id],
            ))
            .await;
        assert!(matches!(result, Err(Error::Schedule(_))));
    }

    #[tokio::test]
    async fn test_scheduling_rejects_times_inside_the_buffer() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;
        let campaign_id = stores
            .campaigns
            .create(&NewCampaign::new("Launch", "Hello", "Team", "t@example.com"))
            .await
            .unwrap();

        let past = Utc::now() - ChronoDuration::hours(1);
        let mut req = request(
            ScheduleType::Scheduled {
                date: past.format("%Y-%m-%d").to_string(),
                time: past.format("%H:%M").to_string(),
            },
            vec![audience.id],
        );
        req.campaign_id = Some(campaign_id);

        let result = orchestrator.send(req).await;
        assert!(matches!(result, Err(Error::Schedule(_))));
    }

    #[tokio::test]
    async fn test_scheduling_persists_the_release_time() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;
        let campaign_id = stores
            .campaigns
            .create(&NewCampaign::new("Launch", "Hello", "Team", "t@example.com"))
            .await
            .unwrap();

        let mut req = request(
            ScheduleType::Scheduled {
                date: "2030-06-01".to_string(),
                time: "09:30".to_string(),
            },
            vec![audience.id],
        );
        req.campaign_id = Some(campaign_id);

        let outcome = orchestrator.send(req).await.unwrap();
        let SendOutcome::Scheduled { scheduled_for, .. } = outcome else {
            panic!("expected scheduled outcome");
        };
        assert_eq!(scheduled_for, parse_schedule("2030-06-01", "09:30").unwrap());

        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
        assert_eq!(campaign.scheduled_at, Some(scheduled_for));
    }

    #[tokio::test]
    async fn test_timezone_window_records_intent_only() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;

        let outcome = orchestrator
            .send(request(
                ScheduleType::Timezone {
                    send_time: "09:00".to_string(),
                    window_hours: 7,
                },
                vec![audience.id],
            ))
            .await
            .unwrap();

        let SendOutcome::TimezoneWindow {
            window_hours,
            estimated_start,
            estimated_completion,
            ..
        } = outcome
        else {
            panic!("expected timezone-window outcome");
        };
        // Unsupported widths widen to a full day.
        assert_eq!(window_hours, 24);
        assert_eq!(
            estimated_completion - estimated_start,
            ChronoDuration::hours(24)
        );
        assert!(estimated_start > Utc::now());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_timezone_window_never_becomes_a_due_scheduled_send() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;
        let campaign_id = stores
            .campaigns
            .create(&NewCampaign::new("Launch", "Hello", "Team", "t@example.com"))
            .await
            .unwrap();

        let mut req = request(
            ScheduleType::Timezone {
                send_time: "09:00".to_string(),
                window_hours: 12,
            },
            vec![audience.id],
        );
        req.campaign_id = Some(campaign_id);
        orchestrator.send(req).await.unwrap();

        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert!(stores
            .campaigns
            .due_for_sending(Utc::now() + ChronoDuration::days(365))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_test_email_override_sends_one_prefixed_message() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(&stores, "Readers", &["a@example.com"]).await;

        let mut req = request(ScheduleType::Immediate, vec![audience.id]);
        req.test_email = Some("me@example.com".to_string());

        let outcome = orchestrator.send(req).await.unwrap();
        assert!(matches!(outcome, SendOutcome::TestSent { .. }));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "me@example.com");
        assert!(sent[0].subject.starts_with("[TEST] "));
        // The placeholder draft gives the tracked links a campaign id;
        // no per-recipient send rows are written.
        assert!(sent[0].html.contains("/track/open"));
        let placeholder = stores.campaigns.get(CampaignId(1)).await.unwrap().unwrap();
        assert_eq!(placeholder.status, CampaignStatus::Draft);
        assert!(stores
            .campaigns
            .sends_for_campaign(placeholder.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_test_email_subject_prefix_is_not_duplicated() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());

        let mut req = request(ScheduleType::Immediate, Vec::new());
        req.subject = "[TEST] Hello".to_string();
        req.test_email = Some("me@example.com".to_string());

        orchestrator.send(req).await.unwrap();
        assert_eq!(transport.sent()[0].subject, "[TEST] Hello");
    }

    #[tokio::test]
    async fn test_test_email_override_rejects_malformed_addresses() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let mut req = request(ScheduleType::Immediate, Vec::new());
        req.test_email = Some("not-an-address".to_string());

        let result = orchestrator.send(req).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_safety_gate_blocks_non_test_audiences_before_any_row() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let config = SendConfig::new("The Team", "team@mail.example.com").safety(SafetyConfig {
            enabled: true,
            allowed_emails: vec!["dev@example.com".to_string()],
            test_audience_names: vec!["test".to_string()],
        });
        let orchestrator = orchestrator(&stores, transport.clone(), config);
        let audience = seeded_audience(&stores, "Customers", &["paying@example.com"]).await;

        let result = orchestrator
            .send(request(ScheduleType::Immediate, vec![audience.id]))
            .await;

        let Err(Error::SafetyBlock { audiences }) = result else {
            panic!("expected a safety block");
        };
        assert_eq!(audiences, vec!["Customers".to_string()]);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_safety_gate_skips_recipients_outside_the_allow_list() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let config = SendConfig::new("The Team", "team@mail.example.com").safety(SafetyConfig {
            enabled: true,
            allowed_emails: vec!["dev@example.com".to_string()],
            test_audience_names: vec!["test".to_string()],
        });
        let orchestrator = orchestrator(&stores, transport.clone(), config);
        let audience = seeded_audience(
            &stores,
            "Test list",
            &["dev@example.com", "stranger@example.com"],
        )
        .await;

        let outcome = orchestrator
            .send(request(ScheduleType::Immediate, vec![audience.id]))
            .await
            .unwrap();

        let SendOutcome::Completed { stats, .. } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(stats.total, 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dev@example.com");
    }

    #[tokio::test]
    async fn test_zero_recipients_is_an_error() {
        let stores = stores().await;
        let orchestrator =
            orchestrator(&stores, Arc::new(MockTransport::default()), open_config());
        let empty = stores
            .audiences
            .create("Empty", &FilterSet::static_set())
            .await
            .unwrap();

        let result = orchestrator
            .send(request(ScheduleType::Immediate, vec![empty.id]))
            .await;
        assert!(matches!(
            result,
            Err(Error::NoRecipients { safety_mode: false })
        ));
    }

    #[tokio::test]
    async fn test_immediate_dispatch_records_and_finalizes() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(
            &stores,
            "Readers",
            &["a@example.com", "b@example.com", "c@example.com"],
        )
        .await;

        let outcome = orchestrator
            .send(request(ScheduleType::Immediate, vec![audience.id]))
            .await
            .unwrap();

        let SendOutcome::Completed {
            campaign_id, stats, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(
            stats,
            DispatchStats {
                sent: 3,
                failed: 0,
                total: 3
            }
        );

        let sends = stores
            .campaigns
            .sends_for_campaign(campaign_id)
            .await
            .unwrap();
        assert_eq!(sends.len(), 3);
        assert!(sends.iter().all(|s| s.status == SendStatus::Sent));
        assert!(sends.iter().all(|s| s.message_id.is_some()));

        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sent);
        assert_eq!(campaign.emails_sent, 3);
        assert_eq!(campaign.total_recipients, 3);
        assert!(campaign.sent_at.is_some());
        // The stored body is the tracked variant.
        assert!(campaign.html_content.unwrap().contains("/track/open"));
    }

    #[tokio::test]
    async fn test_dispatch_deduplicates_and_applies_exclusions() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());

        let first = seeded_audience(&stores, "First", &["a@example.com", "b@example.com"]).await;
        let second = stores
            .audiences
            .create("Second", &FilterSet::static_set())
            .await
            .unwrap();
        let blocked = stores
            .audiences
            .create("Blocked", &FilterSet::static_set())
            .await
            .unwrap();
        let b = stores
            .subscribers
            .by_email("b@example.com")
            .await
            .unwrap()
            .unwrap()
            .id;
        let c = stores
            .subscribers
            .insert(&NewSubscriber::new("c@example.com"))
            .await
            .unwrap();
        stores.audiences.add_member(second.id, b).await.unwrap();
        stores.audiences.add_member(second.id, c).await.unwrap();
        stores.audiences.add_member(blocked.id, c).await.unwrap();

        let mut req = request(ScheduleType::Immediate, vec![first.id, second.id]);
        req.excluded_audience_ids = vec![blocked.id];

        let outcome = orchestrator.send(req).await.unwrap();
        let SendOutcome::Completed { stats, .. } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(stats.total, 2);

        let mut recipients: Vec<String> =
            transport.sent().into_iter().map(|e| e.to).collect();
        recipients.sort();
        assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded_per_recipient() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::rejecting(&["bad@example.com"]));
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(
            &stores,
            "Readers",
            &["good@example.com", "bad@example.com"],
        )
        .await;

        let outcome = orchestrator
            .send(request(ScheduleType::Immediate, vec![audience.id]))
            .await
            .unwrap();

        let SendOutcome::Completed {
            campaign_id,
            stats,
            results,
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);

        let failed = results.iter().find(|r| r.email == "bad@example.com").unwrap();
        assert!(failed.error.as_ref().unwrap().contains("mailbox unavailable"));

        let sends = stores
            .campaigns
            .sends_for_campaign(campaign_id)
            .await
            .unwrap();
        let failed_row = sends.iter().find(|s| s.email == "bad@example.com").unwrap();
        assert_eq!(failed_row.status, SendStatus::Failed);
        assert!(failed_row.error_message.is_some());

        // One success is enough to count the campaign as sent.
        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sent);
    }

    // Real (small) durations: pausing the clock here would also stall the
    // pool-acquire deadlines inside the storage calls.
    #[tokio::test]
    async fn test_slow_transport_times_out_per_recipient() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::stalling(Duration::from_secs(30)));
        let config = open_config().send_timeout(Duration::from_millis(50));
        let orchestrator = orchestrator(&stores, transport, config);
        let audience = seeded_audience(&stores, "Readers", &["slow@example.com"]).await;

        let outcome = orchestrator
            .send(request(ScheduleType::Immediate, vec![audience.id]))
            .await
            .unwrap();

        let SendOutcome::Completed {
            campaign_id, stats, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(stats.failed, 1);

        let sends = stores
            .campaigns
            .sends_for_campaign(campaign_id)
            .await
            .unwrap();
        assert_eq!(sends[0].status, SendStatus::Failed);
        assert_eq!(sends[0].error_message.as_deref(), Some("send timed out"));
        // All-failed runs are not marked sent.
        let campaign = stores.campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_ne!(campaign.status, CampaignStatus::Sent);
    }

    #[tokio::test]
    async fn test_cancellation_fails_remaining_recipients() {
        let stores = stores().await;
        let transport = Arc::new(MockTransport::default());
        let orchestrator = orchestrator(&stores, transport.clone(), open_config());
        let audience = seeded_audience(
            &stores,
            "Readers",
            &["a@example.com", "b@example.com"],
        )
        .await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = orchestrator
            .send_with_cancel(request(ScheduleType::Immediate, vec![audience.id]), &cancel)
            .await
            .unwrap();

        let SendOutcome::Completed {
            campaign_id, stats, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 2);
        assert!(transport.sent().is_empty());

        let sends = stores
            .campaigns
            .sends_for_campaign(campaign_id)
            .await
            .unwrap();
        assert!(sends.iter().all(|s| s.status == SendStatus::Failed));
        assert!(sends
            .iter()
            .all(|s| s.error_message.as_deref() == Some("cancelled before dispatch")));
    }

    #[test]
    fn test_email_shape_check() {
        assert!(is_valid_email("someone@example.com"));
        assert!(!is_valid_email("someone"));
        assert!(!is_valid_email("someone@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("someone@.com"));
    }
}
