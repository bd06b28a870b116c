//! Service wiring
//!
//! [`Portal`] builds every component over one store, one payment provider and
//! one notification sink, sharing the configuration and dispatcher.

use std::sync::Arc;

use tracing::info;

use crate::billing::BillingService;
use crate::complaints::ComplaintService;
use crate::config::PortalConfig;
use crate::identity::{RegistrationService, SessionService};
use crate::notifications::{Dispatcher, NotificationSink};
use crate::provider::PaymentProvider;
use crate::receipts::{ReceiptGenerator, TemplateReceiptRenderer};
use crate::reconciliation::ReconciliationService;
use crate::scoping::analytics::AnalyticsService;
use crate::store::PortalStore;

pub struct Portal {
    pub store: Arc<dyn PortalStore>,
    pub config: Arc<PortalConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: SessionService,
    pub registration: RegistrationService,
    pub complaints: ComplaintService,
    pub analytics: AnalyticsService,
    pub billing: BillingService,
    pub reconciliation: ReconciliationService,
}

impl Portal {
    /// Wire the portal with the handlebars receipt renderer.
    pub fn new(
        store: Arc<dyn PortalStore>,
        provider: Arc<dyn PaymentProvider>,
        sink: Arc<dyn NotificationSink>,
        config: PortalConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let receipts: Arc<dyn ReceiptGenerator> = Arc::new(TemplateReceiptRenderer::new(&config)?);
        Ok(Self::with_receipts(store, provider, sink, receipts, config))
    }

    pub fn with_receipts(
        store: Arc<dyn PortalStore>,
        provider: Arc<dyn PaymentProvider>,
        sink: Arc<dyn NotificationSink>,
        receipts: Arc<dyn ReceiptGenerator>,
        config: PortalConfig,
    ) -> Self {
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::new(sink, config.notification_sender.clone()));

        info!(
            currency = %config.currency_label,
            exchange_rate = %config.exchange_rate,
            provider_currency = %config.provider_currency,
            "Portal services initialised"
        );

        Self {
            sessions: SessionService::new(Arc::clone(&store), config.session_ttl),
            registration: RegistrationService::new(Arc::clone(&store), Arc::clone(&dispatcher)),
            complaints: ComplaintService::new(Arc::clone(&store), Arc::clone(&dispatcher)),
            analytics: AnalyticsService::new(Arc::clone(&store)),
            billing: BillingService::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                Arc::clone(&config),
            ),
            reconciliation: ReconciliationService::new(
                Arc::clone(&store),
                provider,
                receipts,
                Arc::clone(&dispatcher),
                Arc::clone(&config),
            ),
            store,
            config,
            dispatcher,
        }
    }
}
