pub mod contribution_service;
pub mod fine_service;
pub mod loan_service;
pub mod member_service;
pub mod overdue_monitor;

pub use contribution_service::ContributionService;
pub use fine_service::FineService;
pub use loan_service::LoanService;
pub use member_service::MemberService;
pub use overdue_monitor::OverdueMonitor;
