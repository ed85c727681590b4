//! Reference catalog and a random product factory

use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;

use super::product::ProductData;

/// `(id, model, capacity, quantity)` of the reference phones
const REFERENCE_STOCK: [(i64, &str, &str, i64); 5] = [
    (4450, "iPhone SE", "2GB/16GB", 13),
    (4768, "iPhone SE", "2GB/32GB", 30),
    (4451, "iPhone SE", "2GB/64GB", 20),
    (4574, "iPhone SE", "2GB/128GB", 16),
    (6039, "iPhone SE (2020)", "3GB/64GB", 18),
];

const FACTORY_MODELS: [&str; 5] = [
    "iPhone SE",
    "iPhone SE (2020)",
    "iPhone 11",
    "iPhone 13",
    "iPhone 14",
];

const FACTORY_CAPACITIES: [&str; 6] = [
    "2GB/16GB",
    "2GB/32GB",
    "2GB/64GB",
    "2GB/128GB",
    "3GB/64GB",
    "4GB/128GB",
];

pub const FACTORY_ID_RANGE: std::ops::RangeInclusive<i64> = 4000..=9999;

pub fn reference_products() -> Vec<ProductData> {
    REFERENCE_STOCK
        .iter()
        .map(|(id, model, capacity, quantity)| {
            ProductData::new("Smartphone", "Apple", *model, *capacity, *quantity).with_id(*id)
        })
        .collect()
}

/// Up to `count` random products with distinct ids in [`FACTORY_ID_RANGE`],
/// none of which appear in `taken`. Fewer are returned once the range runs out.
pub fn fake_products<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    taken: &HashSet<i64>,
) -> Vec<ProductData> {
    let available = FACTORY_ID_RANGE
        .clone()
        .filter(|id| !taken.contains(id))
        .count();
    let count = count.min(available);

    let mut used = HashSet::with_capacity(count);
    let mut products = Vec::with_capacity(count);

    while products.len() < count {
        let id = rng.random_range(FACTORY_ID_RANGE);
        if taken.contains(&id) || !used.insert(id) {
            continue;
        }

        let model = FACTORY_MODELS.choose(rng).copied().unwrap_or(FACTORY_MODELS[0]);
        let capacity = FACTORY_CAPACITIES
            .choose(rng)
            .copied()
            .unwrap_or(FACTORY_CAPACITIES[0]);

        products.push(
            ProductData::new("Smartphone", "Apple", model, capacity, rng.random_range(5..=50))
                .with_id(id),
        );
    }

    products
}
