use serde::{Deserialize, Serialize};

use crate::model::{Cents, PriceBreakdown, ServiceOrdered};

/// Tax rate and flat fee applied to every stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Basis points: 1000 = 10%.
    pub tax_rate_bps: u32,
    pub service_fee: Cents,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_000,
            service_fee: 2_500,
        }
    }
}

/// Price a stay. Tax is charged on rooms + services, rounded half-up to the
/// cent; the flat fee is untaxed.
pub fn quote(
    nightly_rate: Cents,
    nights: i64,
    services: &[ServiceOrdered],
    policy: &PricingPolicy,
) -> PriceBreakdown {
    let room_subtotal = nightly_rate * nights;
    let services_subtotal: Cents = services.iter().map(|s| s.line_total).sum();
    let tax = apply_rate(room_subtotal + services_subtotal, policy.tax_rate_bps);
    PriceBreakdown {
        nights,
        nightly_rate,
        room_subtotal,
        services_subtotal,
        tax,
        service_fee: policy.service_fee,
        total: room_subtotal + services_subtotal + tax + policy.service_fee,
    }
}

fn apply_rate(amount: Cents, bps: u32) -> Cents {
    (amount * bps as Cents + 5_000).div_euclid(10_000)
}
