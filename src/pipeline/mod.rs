//! Claims processing pipeline — relevance filter, fulfillment
//! assessment, and the batch processor that ties them to the services.

pub mod filter;
pub mod fulfillment;
pub mod processor;
pub mod types;

pub use filter::RelevanceFilter;
pub use fulfillment::FulfillmentEngine;
pub use processor::ClaimProcessor;
pub use types::{Assessment, FulfillmentStatus, IncomingClaim, RelevanceVerdict};
