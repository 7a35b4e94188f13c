//! Tiered query resolution: dataset → medical model → generic model.
//!
//! Each query walks the tiers in order and stops at the first one that yields
//! an answer. Every tier is called at most once per query, and every remote
//! call is bounded by a deadline and a cancellation token. Nothing in here
//! returns an error: remote failures become either a fallback to the next
//! tier or, for the last tier, the text shown to the user.

use std::fmt;
use std::time::Duration;

use medinfo_dataset::{MedicineDataset, format_record};
use medinfo_models::AnswerModel;
use medinfo_shared::{AppConfig, ServiceError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shown when no tier can answer and the generic tier is disabled.
pub const NOT_FOUND_MESSAGE: &str = "I couldn't find information about that medicine. \
     Please check the spelling or consult a pharmacist or doctor.";

/// Shown before the generic tier's answer.
pub const GENERIC_FALLBACK_NOTICE: &str = "I couldn't find details for this medicine in the \
     dataset or model, so I'm asking a general knowledge model...";

/// Shown when the user aborts a query in flight.
pub const CANCELLED_MESSAGE: &str = "Request cancelled.";

/// Reply to the `exit` command.
pub const FAREWELL_MESSAGE: &str = "Thank you for using the assistant. Stay healthy!";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a raw line of user input means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput<'a> {
    /// Blank input; produces no turn.
    Empty,
    /// The `exit` control command (any case, surrounding whitespace ignored).
    Exit,
    /// A medicine query, passed to the tiers as typed.
    Query(&'a str),
}

/// Classify a raw line of input.
pub fn classify_input(raw: &str) -> UserInput<'_> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UserInput::Empty
    } else if trimmed.eq_ignore_ascii_case("exit") {
        UserInput::Exit
    } else {
        UserInput::Query(raw)
    }
}

/// One of the ordered information sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Dataset,
    MedicalModel,
    GenericModel,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset => write!(f, "dataset"),
            Self::MedicalModel => write!(f, "medical model"),
            Self::GenericModel => write!(f, "generic model"),
        }
    }
}

/// Where the final answer text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Dataset,
    MedicalModel,
    /// Includes the generic tier's own error text, which is also displayed.
    GenericModel,
    NotFound,
    Cancelled,
    /// The input was the `exit` command; no tier was consulted.
    Farewell,
    /// The input was blank; no tier was consulted and `text` is empty.
    Ignored,
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub source: AnswerSource,
    /// Assistant text to display.
    pub text: String,
    /// Interstitial message to display before `text`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl Resolution {
    fn answer(source: AnswerSource, text: String) -> Self {
        Self {
            source,
            text,
            notice: None,
        }
    }

    fn cancelled() -> Self {
        Self::answer(AnswerSource::Cancelled, CANCELLED_MESSAGE.to_string())
    }
}

/// Per-tier deadlines.
#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    pub medical_deadline: Duration,
    pub generic_deadline: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            medical_deadline: Duration::from_secs(60),
            generic_deadline: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for ResolverOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            medical_deadline: Duration::from_secs(config.medical_model.timeout_secs),
            generic_deadline: Duration::from_secs(config.generic_model.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback so front ends can show which tier is working.
pub trait ResolveProgress: Send + Sync {
    /// Called before a tier is consulted.
    fn tier_started(&self, tier: Tier);
    /// Called when a remote tier fails and the resolver moves on.
    fn tier_failed(&self, tier: Tier, error: &ServiceError);
}

/// No-op progress for headless/test usage.
pub struct SilentProgress;

impl ResolveProgress for SilentProgress {
    fn tier_started(&self, _tier: Tier) {}
    fn tier_failed(&self, _tier: Tier, _error: &ServiceError) {}
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The tiered pipeline. Remote tiers are optional: a disabled or unreachable
/// tier is simply skipped.
pub struct Resolver<M, G> {
    dataset: MedicineDataset,
    medical: Option<M>,
    generic: Option<G>,
    options: ResolverOptions,
}

impl<M: AnswerModel, G: AnswerModel> Resolver<M, G> {
    /// A resolver that only consults the dataset until tiers are attached.
    pub fn new(dataset: MedicineDataset, options: ResolverOptions) -> Self {
        Self {
            dataset,
            medical: None,
            generic: None,
            options,
        }
    }

    pub fn with_medical(mut self, model: M) -> Self {
        self.medical = Some(model);
        self
    }

    pub fn with_generic(mut self, model: G) -> Self {
        self.generic = Some(model);
        self
    }

    pub fn dataset(&self) -> &MedicineDataset {
        &self.dataset
    }

    /// Tiers that will be consulted, in order.
    pub fn active_tiers(&self) -> Vec<Tier> {
        let mut tiers = vec![Tier::Dataset];
        if self.medical.is_some() {
            tiers.push(Tier::MedicalModel);
        }
        if self.generic.is_some() {
            tiers.push(Tier::GenericModel);
        }
        tiers
    }

    /// Resolve one query to display text.
    ///
    /// `exit` and blank input are answered here without consulting any tier.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn resolve(
        &self,
        query: &str,
        cancel: &CancellationToken,
        progress: &dyn ResolveProgress,
    ) -> Resolution {
        let query = match classify_input(query) {
            UserInput::Empty => return Resolution::answer(AnswerSource::Ignored, String::new()),
            UserInput::Exit => {
                return Resolution::answer(AnswerSource::Farewell, FAREWELL_MESSAGE.to_string());
            }
            UserInput::Query(q) => q,
        };

        progress.tier_started(Tier::Dataset);
        if let Some(record) = self.dataset.lookup(query) {
            info!(medicine = %record.name, "answered from dataset");
            return Resolution::answer(AnswerSource::Dataset, format_record(record));
        }
        debug!("dataset miss");

        if let Some(medical) = &self.medical {
            progress.tier_started(Tier::MedicalModel);
            match call_tier(medical, query, self.options.medical_deadline, cancel).await {
                Ok(answer) => {
                    info!(model = medical.name(), "answered from medical model");
                    return Resolution::answer(AnswerSource::MedicalModel, answer);
                }
                Err(ServiceError::Cancelled) => return Resolution::cancelled(),
                Err(e) => {
                    log_failure(Tier::MedicalModel, &e);
                    progress.tier_failed(Tier::MedicalModel, &e);
                }
            }
        }

        let Some(generic) = &self.generic else {
            info!("no tier could answer");
            return Resolution::answer(AnswerSource::NotFound, NOT_FOUND_MESSAGE.to_string());
        };

        progress.tier_started(Tier::GenericModel);
        let text = match call_tier(generic, query, self.options.generic_deadline, cancel).await {
            Ok(answer) => {
                info!(model = generic.name(), "answered from generic model");
                answer
            }
            Err(ServiceError::Cancelled) => return Resolution::cancelled(),
            Err(e) => {
                log_failure(Tier::GenericModel, &e);
                progress.tier_failed(Tier::GenericModel, &e);
                e.user_message()
            }
        };

        Resolution {
            source: AnswerSource::GenericModel,
            text,
            notice: Some(GENERIC_FALLBACK_NOTICE.to_string()),
        }
    }
}

/// Call one remote tier under a deadline and a cancellation token.
///
/// A blank answer counts as no answer.
async fn call_tier<M: AnswerModel>(
    model: &M,
    query: &str,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<String, ServiceError> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        res = tokio::time::timeout(deadline, model.ask(query)) => {
            res.unwrap_or_else(|_| Err(ServiceError::Timeout(deadline)))
        }
    };

    match outcome {
        Ok(answer) if answer.trim().is_empty() => Err(ServiceError::NoCandidates),
        other => other,
    }
}

fn log_failure(tier: Tier, error: &ServiceError) {
    if error.is_transport() {
        warn!(%tier, %error, "tier unreachable");
    } else {
        warn!(%tier, %error, "tier gave no usable answer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use medinfo_shared::MedicineRecord;

    #[derive(Clone)]
    struct FakeModel {
        reply: Result<String, ServiceError>,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeModel {
        fn replying(reply: Result<String, ServiceError>) -> Self {
            Self {
                reply,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::replying(Ok("too late".into()))
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AnswerModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn ask(&self, _query: &str) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    fn paracetamol_dataset() -> MedicineDataset {
        MedicineDataset::new(vec![MedicineRecord {
            name: "Paracetamol".into(),
            composition: "Paracetamol 500mg".into(),
            uses: "Fever".into(),
            side_effects: "Nausea".into(),
            manufacturer: "ACME".into(),
            excellent_review_pct: 80.0,
            average_review_pct: 15.0,
            poor_review_pct: 5.0,
            image_url: "http://x/p.png".into(),
        }])
    }

    fn resolver(medical: &FakeModel, generic: &FakeModel) -> Resolver<FakeModel, FakeModel> {
        Resolver::new(paracetamol_dataset(), ResolverOptions::default())
            .with_medical(medical.clone())
            .with_generic(generic.clone())
    }

    async fn resolve(r: &Resolver<FakeModel, FakeModel>, query: &str) -> Resolution {
        r.resolve(query, &CancellationToken::new(), &SilentProgress).await
    }

    #[tokio::test]
    async fn dataset_hit_skips_remote_tiers() {
        let medical = FakeModel::replying(Ok("unused".into()));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "paracetamol").await;
        assert_eq!(res.source, AnswerSource::Dataset);
        assert!(res.text.contains("Paracetamol 500mg"));
        assert!(res.text.contains("80%"));
        assert_eq!(medical.calls(), 0);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn medical_answer_is_returned_verbatim() {
        let medical = FakeModel::replying(Ok("Consult a doctor.".into()));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::MedicalModel);
        assert_eq!(res.text, "Consult a doctor.");
        assert!(res.notice.is_none());
        assert_eq!(medical.calls(), 1);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn medical_error_falls_back_to_generic_once() {
        let medical = FakeModel::replying(Err(ServiceError::Transport("refused".into())));
        let generic = FakeModel::replying(Ok("Generic answer.".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert_eq!(res.text, "Generic answer.");
        assert_eq!(res.notice.as_deref(), Some(GENERIC_FALLBACK_NOTICE));
        assert_eq!(medical.calls(), 1);
        assert_eq!(generic.calls(), 1);
    }

    #[tokio::test]
    async fn blank_medical_answer_falls_back() {
        let medical = FakeModel::replying(Ok("   \n".into()));
        let generic = FakeModel::replying(Ok("Generic answer.".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert_eq!(medical.calls(), 1);
        assert_eq!(generic.calls(), 1);
    }

    #[tokio::test]
    async fn generic_http_error_is_displayed_not_fatal() {
        let medical = FakeModel::replying(Err(ServiceError::Remote("boom".into())));
        let generic = FakeModel::replying(Err(ServiceError::Status {
            status: 429,
            body: "quota".into(),
        }));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert!(res.text.contains("429"));
        assert_eq!(generic.calls(), 1);
    }

    #[tokio::test]
    async fn generic_no_candidates_shows_fixed_message() {
        let medical = FakeModel::replying(Ok(String::new()));
        let generic = FakeModel::replying(Err(ServiceError::NoCandidates));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(
            res.text,
            "I'm sorry, but I couldn't retrieve the information you requested."
        );
    }

    #[tokio::test]
    async fn without_generic_tier_miss_is_not_found() {
        let medical = FakeModel::replying(Err(ServiceError::Transport("down".into())));
        let r: Resolver<FakeModel, FakeModel> =
            Resolver::new(paracetamol_dataset(), ResolverOptions::default())
                .with_medical(medical.clone());

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::NotFound);
        assert_eq!(res.text, NOT_FOUND_MESSAGE);
        assert_eq!(medical.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_medical_tier_goes_straight_to_generic() {
        let generic = FakeModel::replying(Ok("Generic answer.".into()));
        let r: Resolver<FakeModel, FakeModel> =
            Resolver::new(paracetamol_dataset(), ResolverOptions::default())
                .with_generic(generic.clone());

        assert_eq!(r.active_tiers(), vec![Tier::Dataset, Tier::GenericModel]);
        let res = resolve(&r, "ibuprofen").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert_eq!(generic.calls(), 1);
    }

    #[test]
    fn classifies_exit_in_any_case() {
        for raw in ["exit", "EXIT", "  Exit  ", "\teXiT\n"] {
            assert_eq!(classify_input(raw), UserInput::Exit, "{raw:?}");
        }
        assert_eq!(classify_input("exit now"), UserInput::Query("exit now"));
        assert_eq!(classify_input("exitol"), UserInput::Query("exitol"));
        assert_eq!(classify_input("  "), UserInput::Empty);
    }

    #[tokio::test]
    async fn blank_query_reaches_no_tier() {
        let medical = FakeModel::replying(Ok("Please ask a question.".into()));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "   ").await;
        assert_eq!(res.source, AnswerSource::Ignored);
        assert!(res.text.is_empty());
        assert_eq!(medical.calls(), 0);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn exit_reaches_no_tier() {
        let medical = FakeModel::replying(Ok("model text".into()));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let res = resolve(&r, "  EXIT ").await;
        assert_eq!(res.source, AnswerSource::Farewell);
        assert_eq!(res.text, FAREWELL_MESSAGE);
        assert_eq!(medical.calls(), 0);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn slow_medical_tier_times_out_and_falls_back() {
        let medical = FakeModel::slow(Duration::from_secs(30));
        let generic = FakeModel::replying(Ok("Generic answer.".into()));
        let r = Resolver::new(
            paracetamol_dataset(),
            ResolverOptions {
                medical_deadline: Duration::from_millis(50),
                generic_deadline: Duration::from_secs(5),
            },
        )
        .with_medical(medical.clone())
        .with_generic(generic.clone());

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert_eq!(res.text, "Generic answer.");
        assert_eq!(medical.calls(), 1);
    }

    #[tokio::test]
    async fn slow_generic_tier_reports_timeout() {
        let medical = FakeModel::replying(Err(ServiceError::NoCandidates));
        let generic = FakeModel::slow(Duration::from_secs(30));
        let r = Resolver::new(
            paracetamol_dataset(),
            ResolverOptions {
                medical_deadline: Duration::from_secs(5),
                generic_deadline: Duration::from_millis(50),
            },
        )
        .with_medical(medical)
        .with_generic(generic);

        let res = resolve(&r, "xyzabc123").await;
        assert_eq!(res.source, AnswerSource::GenericModel);
        assert!(res.text.contains("did not answer"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_pipeline() {
        let medical = FakeModel::slow(Duration::from_secs(30));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let res = r.resolve("xyzabc123", &cancel, &SilentProgress).await;
        assert_eq!(res.source, AnswerSource::Cancelled);
        assert_eq!(res.text, CANCELLED_MESSAGE);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_calls_no_remote_tier() {
        let medical = FakeModel::replying(Ok("unused".into()));
        let generic = FakeModel::replying(Ok("unused".into()));
        let r = resolver(&medical, &generic);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = r.resolve("xyzabc123", &cancel, &SilentProgress).await;
        assert_eq!(res.source, AnswerSource::Cancelled);
        assert_eq!(medical.calls(), 0);
        assert_eq!(generic.calls(), 0);
    }

    #[tokio::test]
    async fn progress_sees_every_tier() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);

        impl ResolveProgress for Recorder {
            fn tier_started(&self, tier: Tier) {
                self.0.lock().unwrap().push(format!("start {tier}"));
            }
            fn tier_failed(&self, tier: Tier, _error: &ServiceError) {
                self.0.lock().unwrap().push(format!("fail {tier}"));
            }
        }

        let medical = FakeModel::replying(Err(ServiceError::Transport("down".into())));
        let generic = FakeModel::replying(Ok("ok".into()));
        let r = resolver(&medical, &generic);
        let recorder = Recorder::default();

        r.resolve("xyzabc123", &CancellationToken::new(), &recorder).await;
        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start dataset",
                "start medical model",
                "fail medical model",
                "start generic model",
            ]
        );
    }

    #[test]
    fn resolution_serializes_source() {
        let res = Resolution::answer(AnswerSource::MedicalModel, "hi".into());
        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(json, r#"{"source":"medical_model","text":"hi"}"#);
    }
}
