//! Round engines of the three game modes and the collaborators they share.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{error, warn};

use crate::{
    dao::{catalog::CatalogService, kv::KvStore},
    error::ServiceError,
    state::content::GameMode,
};

use self::{notifier::Notifier, score_ledger::ScoreLedger};

/// Board/lottery mode engine.
pub mod board_service;
/// Image reveal mode engine.
pub mod image_service;
/// Operator notice broadcasting.
pub mod notifier;
/// Snapshot, played set and filter persistence.
pub mod resume;
/// Score service client with a reconciled cache.
pub mod score_ledger;
/// Catalog-backed content pool of one mode.
pub mod session_pool;
/// Word reveal mode engine.
pub mod word_service;

/// Bound applied to a single collaborator call unless configured otherwise.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Await one collaborator call, giving up with [`ServiceError::Timeout`]
/// after `limit`.
pub(crate) async fn bounded<T, E>(
    limit: Duration,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, ServiceError>
where
    ServiceError: From<E>,
{
    match timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Collaborators shared by every engine.
#[derive(Clone)]
pub struct Collaborators {
    /// Content catalog.
    pub catalog: Arc<dyn CatalogService>,
    /// Team scores.
    pub ledger: Arc<ScoreLedger>,
    /// Durable key-value store for resume state.
    pub kv: Arc<dyn KvStore>,
    /// Operator notices.
    pub notifier: Arc<Notifier>,
}

/// What an operator action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action changed the round.
    Applied,
    /// The action was refused and nothing changed.
    Ignored(String),
}

impl ActionOutcome {
    /// Whether the action changed the round.
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

/// Turn the result of an engine action into its public outcome.
///
/// Refusals are logged and reported as [`ActionOutcome::Ignored`]; real
/// failures are surfaced to the operator and returned.
pub(crate) fn settle(
    mode: GameMode,
    action: &'static str,
    notifier: &Notifier,
    result: Result<(), ServiceError>,
) -> Result<ActionOutcome, ServiceError> {
    match result {
        Ok(()) => Ok(ActionOutcome::Applied),
        Err(err) if err.is_rejection() => {
            warn!(mode = %mode, action, reason = %err, "action ignored");
            Ok(ActionOutcome::Ignored(err.to_string()))
        }
        Err(err) => {
            let detail = match &err {
                ServiceError::Unavailable(source) => format!("{err}: {source}"),
                other => other.to_string(),
            };
            error!(mode = %mode, action, error = %detail, "action failed");
            notifier.error(Some(mode), format!("{action}: {detail}"));
            Err(err)
        }
    }
}
