pub mod appointment;
pub mod billing;
pub mod dashboard;
pub mod doctor;
pub mod patient;
pub mod principal;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, AppointmentView};
pub use billing::{Invoice, InvoiceView};
pub use dashboard::{DashboardView, Section, UnavailableMarker};
pub use doctor::{Doctor, DoctorSummary};
pub use patient::{Patient, PatientView};
pub use principal::Principal;
pub use refresh_token::{hash_token, DeviceInfo, RefreshTokenRecord};
pub use role::Role;
pub use user::{LockStatus, LockoutPolicy, LockoutState, SanitizedUser, User};
