pub mod field_reports;
pub mod health;
pub mod resources;
pub mod restorations;
pub mod tickets;

use crate::services::{
    field_reports::FieldReportService, resource_lifecycle::ResourceLifecycleService,
    restoration::RestorationService, tickets::TicketService,
};

/// All application services, wired once at startup and shared through
/// [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub resources: ResourceLifecycleService,
    pub restoration: RestorationService,
    pub tickets: TicketService,
    pub field_reports: FieldReportService,
}
