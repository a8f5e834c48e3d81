//! Amounts, fees and the refund ratio.

use serde::{Deserialize, Serialize};

use super::{round2, Sources};
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialFields {
    pub amount_claimed: Option<f64>,
    pub amount_refunded: Option<f64>,
    pub currency: Option<String>,
    pub order_total: Option<f64>,
    pub paid_amount: Option<f64>,
    pub product_cost: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub marketplace_fee: Option<f64>,
    /// Paid amount minus marketplace fee and shipping cost.
    pub net_amount: Option<f64>,
    /// Refunded share of the order total, in percent.
    pub refund_percentage: Option<f64>,
}

pub fn map(src: &Sources<'_>) -> FinancialFields {
    let order_total: Option<f64> = extract::get_opt(src.order, "total_amount");
    let paid_amount: Option<f64> = extract::get_opt(src.order, "paid_amount");
    let shipping_cost: Option<f64> =
        extract::first_present(&[(src.order, "shipping_cost"), (src.order, "shipping.cost")]);
    let marketplace_fee = item_sum(src, "sale_fee");
    let amount_refunded = amount_refunded(src);

    let net_amount = paid_amount
        .map(|paid| round2(paid - marketplace_fee.unwrap_or(0.0) - shipping_cost.unwrap_or(0.0)));
    let refund_percentage = match (amount_refunded, order_total) {
        (Some(refunded), Some(total)) if total > 0.0 => Some(round2(refunded / total * 100.0)),
        _ => None,
    };

    FinancialFields {
        amount_claimed: amount_claimed(src),
        amount_refunded,
        currency: extract::first_present(&[
            (src.claim(), "currency_id"),
            (src.order, "currency_id"),
            (src.return_details, "currency_id"),
        ]),
        order_total,
        paid_amount,
        product_cost: item_sum(src, "unit_price"),
        shipping_cost,
        marketplace_fee,
        net_amount,
        refund_percentage,
    }
}

/// Disputed amount: the claim's own figure, else the order total.
pub fn amount_claimed(src: &Sources<'_>) -> Option<f64> {
    extract::first_present(&[
        (src.claim(), "claim_details.amount"),
        (src.claim(), "amount"),
        (src.order, "total_amount"),
    ])
}

pub fn amount_refunded(src: &Sources<'_>) -> Option<f64> {
    extract::first_present(&[
        (src.return_details, "refund_amount"),
        (src.return_details, "refund.amount"),
        (src.claim(), "resolution.refund_amount"),
    ])
}

/// `Σ field × quantity` over the order lines; `None` when no line has the field.
fn item_sum(src: &Sources<'_>, field: &str) -> Option<f64> {
    let lines = extract::first_array(&[(src.order, "order_items")]);
    let mut total = None;
    for line in lines {
        let Some(value) = extract::get::<f64>(line, field) else {
            continue;
        };
        let quantity = extract::get::<f64>(line, "quantity").unwrap_or(1.0);
        *total.get_or_insert(0.0) += value * quantity;
    }
    total.map(round2)
}
