pub mod booking;
pub mod dashboard;
pub mod driver;
pub mod location;
pub mod service_class;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use dashboard::DashboardEvent;
pub use driver::Driver;
pub use location::Location;
pub use service_class::ServiceClass;
pub use user::User;
