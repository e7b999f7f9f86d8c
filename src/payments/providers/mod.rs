pub mod flutterwave;
pub mod paystack;
pub mod stripe;

pub use flutterwave::{FlutterwaveConfig, FlutterwaveProvider};
pub use paystack::{PaystackConfig, PaystackProvider};
pub use stripe::{StripeConfig, StripeProvider};
