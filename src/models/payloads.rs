//! Dataset payload types

use serde::{Deserialize, Serialize};

/// A rentable loft listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loft {
    pub id: u64,
    pub name: String,
    pub location: String,
    /// Nightly price in the platform currency's minor units
    pub price_per_night: u64,
    pub capacity: u32,
    #[serde(default)]
    pub amenities: Vec<String>,
}

/// A guest testimonial shown on the marketing pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: u64,
    pub author: String,
    pub message: String,
    /// 1 to 5 stars
    pub rating: u8,
}
