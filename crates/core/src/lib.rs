//! # Fanledger Core
//!
//! Domain types cho credit ledger: hai loại credit (paid / bonus), bảng
//! spend policy, commission splitter (pure) và các trạng thái của payment,
//! earning, accounting queue.

pub mod commission;
pub mod credit;
pub mod earning;
pub mod error;
pub mod payment;

pub use commission::{compute_split, AgencyTerms, Attribution, ChatterRef, CommissionPolicy, Split};
pub use credit::{CreditBalances, CreditType, GrantType, SpendType, TransactionType};
pub use earning::{EarningStatus, RecipientType};
pub use error::{CoreError, CoreResult};
pub use payment::{PaymentProvider, PaymentStatus, PaymentType, QueueStatus};
