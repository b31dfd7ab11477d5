//! Scan workflow engine
//!
//! One scan runs through [`State`] strictly in order:
//!
//! ```text
//! ResolveTargets → Lookup ─┬─────────→ Start → Bind → Consume ─┬→ Complete ─┐
//!                          └→ Recruit ─┘                       │             ▼
//!                                                              └──→ CheckExhaustion → Done
//! ```
//!
//! Usage is consumed after the bind call whatever its verdict, because the
//! material is already on the unit. Every terminal state dispatches exactly
//! one PLC trigger for `(side, success)`.

use std::sync::Arc;

use errors::StationError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Level};

use super::state::{Outcome, State, Verdict, WorkflowContext};
use crate::core::channels::SignalDispatcher;
use crate::core::config::{ConfigPersister, MesConfig, Side, Trigger};
use crate::core::ledger::MaterialUsageLedger;
use crate::core::mes::MesClient;

/// Source of the host MAC used for shop-order lookup
pub type MacProvider = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct WorkflowEngine {
    mes_config: Arc<MesConfig>,
    mes: Arc<dyn MesClient>,
    ledger: Arc<MaterialUsageLedger>,
    dispatcher: SignalDispatcher,
    persister: ConfigPersister,
    halt: CancellationToken,
    mac_provider: MacProvider,
}

impl WorkflowEngine {
    pub fn new(
        mes_config: MesConfig,
        mes: Arc<dyn MesClient>,
        ledger: Arc<MaterialUsageLedger>,
        dispatcher: SignalDispatcher,
        persister: ConfigPersister,
    ) -> Self {
        Self {
            mes_config: Arc::new(mes_config),
            mes,
            ledger,
            dispatcher,
            persister,
            halt: CancellationToken::new(),
            mac_provider: Arc::new(common::system_info::local_mac_address),
        }
    }

    pub fn with_mac_provider(mut self, provider: MacProvider) -> Self {
        self.mac_provider = provider;
        self
    }

    /// Cancelled once a scan ends in [`Outcome::Stopped`]
    pub fn halt_token(&self) -> CancellationToken {
        self.halt.clone()
    }

    pub fn ledger(&self) -> &Arc<MaterialUsageLedger> {
        &self.ledger
    }

    pub fn dispatcher(&self) -> &SignalDispatcher {
        &self.dispatcher
    }

    pub fn persister(&self) -> &ConfigPersister {
        &self.persister
    }

    /// Run one scanned SN to its terminal outcome
    ///
    /// Never fails: MES rejections end in NG, exhaustion in STOPPED, and the
    /// matching PLC trigger has been dispatched by the time this returns.
    pub async fn process_scan(&self, side: Side, sn: &str) -> Outcome {
        let (station, device) = self.mes_config.identity(side);
        let mut ctx = WorkflowContext::new(side, sn, station, device);
        let span = info_span!("scan", run = %ctx.run_id.simple(), side = %side, sn = %sn);

        async move {
            info!("Processing {} at {} ({})", ctx.sn, ctx.station_name, ctx.device_code);

            let mut state = State::ResolveTargets;
            let verdict = loop {
                debug!("→ {}", state.name());
                state = match state {
                    State::ResolveTargets => self.resolve_targets(&mut ctx),
                    State::Lookup => self.lookup(&mut ctx).await,
                    State::Recruit => self.recruit(&mut ctx).await,
                    State::Start => self.start(&ctx).await,
                    State::Bind => self.bind(&ctx).await,
                    State::Consume { bind_failure } => self.consume(&ctx, bind_failure).await,
                    State::Complete => self.complete(&ctx).await,
                    State::CheckExhaustion { failure } => self.check_exhaustion(&ctx, failure),
                    State::Done(verdict) => break verdict,
                };
            };

            self.report(&ctx, verdict).await
        }
        .instrument(span)
        .await
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn resolve_targets(&self, ctx: &mut WorkflowContext) -> State {
        match self.ledger.targets(ctx.side, self.mes_config.bind_all_lots) {
            Ok(targets) => {
                ctx.targets = targets;
                State::Lookup
            },
            Err(e) => State::Done(Verdict::ng(e)),
        }
    }

    async fn lookup(&self, ctx: &mut WorkflowContext) -> State {
        let response = self.mes.lookup_sn(&ctx.sn).await;

        if response.is_pass() {
            return match response.shoporder() {
                Some(shoporder) => {
                    info!("SN found, shop order {}", shoporder);
                    ctx.shoporder = Some(shoporder.to_string());
                    State::Start
                },
                None => State::Done(Verdict::ng(StationError::LookupFailed(
                    "lookup passed without a shop order".to_string(),
                ))),
            };
        }

        let not_found = response.message().contains(&self.mes_config.not_found_marker);
        if not_found && self.mes_config.enable_product_recruit {
            info!("SN unknown to MES, recruiting");
            return State::Recruit;
        }

        State::Done(Verdict::ng(StationError::LookupFailed(
            response.message().to_string(),
        )))
    }

    async fn recruit(&self, ctx: &mut WorkflowContext) -> State {
        let mac = (self.mac_provider)();
        let assigned = self
            .mes
            .get_assigned_shop_order(&ctx.station_name, &mac)
            .await;
        if !assigned.is_pass() {
            return State::Done(Verdict::ng(StationError::RecruitmentFailed(format!(
                "shop order for {} ({}): {}",
                ctx.station_name,
                mac,
                assigned.message()
            ))));
        }
        let Some(shoporder) = assigned.shoporder() else {
            return State::Done(Verdict::ng(StationError::RecruitmentFailed(format!(
                "no shop order assigned to {} ({})",
                ctx.station_name, mac
            ))));
        };
        info!("Station {} runs shop order {}", ctx.station_name, shoporder);

        let recruited = self
            .mes
            .recruit_sn(&ctx.sn, &ctx.station_name, shoporder)
            .await;
        if !recruited.is_pass() {
            return State::Done(Verdict::ng(StationError::RecruitmentFailed(
                recruited.message().to_string(),
            )));
        }

        ctx.shoporder = Some(shoporder.to_string());
        State::Start
    }

    async fn start(&self, ctx: &WorkflowContext) -> State {
        let response = self
            .mes
            .start_process(&ctx.sn, ctx.shoporder(), &ctx.station_name, &ctx.device_code)
            .await;
        if response.is_pass() {
            State::Bind
        } else {
            State::Done(Verdict::ng(StationError::StartRejected(
                response.message().to_string(),
            )))
        }
    }

    async fn bind(&self, ctx: &WorkflowContext) -> State {
        let lot_codes = ctx.lot_codes();
        let response = self
            .mes
            .bind_lots(&ctx.sn, &ctx.device_code, &ctx.station_name, &lot_codes)
            .await;

        let bind_failure = if response.is_pass() {
            info!("Bound {}", lot_codes.join(", "));
            None
        } else {
            Some(StationError::BindFailed(response.message().to_string()))
        };
        State::Consume { bind_failure }
    }

    async fn consume(&self, ctx: &WorkflowContext, bind_failure: Option<StationError>) -> State {
        match self.ledger.consume(&ctx.targets) {
            Ok(changes) if !changes.is_empty() => {
                if let Err(e) = self.persister.persist(self.ledger.snapshot()).await {
                    error!("Usage not persisted: {} [{}]", e, e.error_code());
                }
            },
            Ok(_) => debug!("No usage-controlled target"),
            Err(e) => error!("Usage not consumed: {} [{}]", e, e.error_code()),
        }

        match bind_failure {
            Some(failure) => State::CheckExhaustion {
                failure: Some(failure),
            },
            None => State::Complete,
        }
    }

    async fn complete(&self, ctx: &WorkflowContext) -> State {
        let response = self
            .mes
            .complete_process(&ctx.sn, ctx.shoporder(), &ctx.station_name, &ctx.device_code)
            .await;
        let failure = (!response.is_pass())
            .then(|| StationError::CompleteFailed(response.message().to_string()));
        State::CheckExhaustion { failure }
    }

    fn check_exhaustion(&self, ctx: &WorkflowContext, failure: Option<StationError>) -> State {
        let Some(exhausted) = self.ledger.check_exhausted(&ctx.targets) else {
            return State::Done(match failure {
                Some(e) => Verdict::ng(e),
                None => Verdict::ok(),
            });
        };

        let success = match failure {
            Some(e) => {
                log_error(&e);
                false
            },
            None => true,
        };
        State::Done(Verdict::stopped(success, exhausted))
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    async fn report(&self, ctx: &WorkflowContext, verdict: Verdict) -> Outcome {
        if let Some(e) = &verdict.error {
            log_error(e);
        }

        let trigger = Trigger::for_outcome(ctx.side, verdict.success);
        let report = self.dispatcher.send(trigger).await;
        debug!("{} dispatched: {:?}", trigger, report);

        info!("SN {} -> {}", ctx.sn, verdict.outcome);
        if verdict.outcome == Outcome::Stopped {
            warn!("Material exhausted, halting the station");
            self.halt.cancel();
        }
        verdict.outcome
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("bind_all_lots", &self.mes_config.bind_all_lots)
            .field("halted", &self.halt.is_cancelled())
            .finish()
    }
}

fn log_error(e: &StationError) {
    match e.log_level() {
        Level::ERROR => error!("{} [{}]", e, e.error_code()),
        Level::WARN => warn!("{} [{}]", e, e.error_code()),
        _ => info!("{} [{}]", e, e.error_code()),
    }
}
