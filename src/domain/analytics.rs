//! Back-office sales summary

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SalesSummary {
    pub order_count: usize,
    pub paid_count: usize,
    pub delivered_count: usize,
    pub cancelled_count: usize,
    pub revenue: Decimal,
    pub discounts: Decimal,
    pub average_ticket: Decimal,
    pub top_flavors: Vec<FlavorSales>,
    pub revenue_by_day: Vec<DailyRevenue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlavorSales { pub flavor_id: Uuid, pub product_name: String, pub flavor_name: String, pub units: i64, pub revenue: Decimal }

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyRevenue { pub day: NaiveDate, pub revenue: Decimal, pub orders: usize }

/// Revenue counts paid orders only; cancelled orders are counted and skipped.
pub fn summarize(orders: &[Order], top: usize) -> SalesSummary {
    let mut summary = SalesSummary { order_count: orders.len(), ..Default::default() };
    let mut flavors: HashMap<Uuid, FlavorSales> = HashMap::new();
    let mut days: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();

    for order in orders {
        if order.status == OrderStatus::Cancelled { summary.cancelled_count += 1; continue; }
        if order.delivered { summary.delivered_count += 1; }
        if !order.paid { continue; }
        summary.paid_count += 1;
        summary.revenue += order.total;
        summary.discounts += order.discount;

        let day = order.created_at.date_naive();
        let entry = days.entry(day).or_insert(DailyRevenue { day, revenue: Decimal::ZERO, orders: 0 });
        entry.revenue += order.total;
        entry.orders += 1;

        for item in &order.items {
            let f = flavors.entry(item.flavor_id).or_insert_with(|| FlavorSales {
                flavor_id: item.flavor_id, product_name: item.product_name.clone(), flavor_name: item.flavor_name.clone(), units: 0, revenue: Decimal::ZERO,
            });
            f.units += i64::from(item.quantity);
            f.revenue += item.line_total();
        }
    }

    if summary.paid_count > 0 {
        summary.average_ticket = (summary.revenue / Decimal::from(summary.paid_count)).round_dp(2);
    }
    let mut ranked: Vec<FlavorSales> = flavors.into_values().collect();
    ranked.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| b.revenue.cmp(&a.revenue)).then_with(|| a.flavor_name.cmp(&b.flavor_name)));
    ranked.truncate(top);
    summary.top_flavors = ranked;
    summary.revenue_by_day = days.into_values().collect();
    summary
}
