//! Demo catalog for local runs.

use common::{Money, UserId};
use domain::{ProductStock, Stall};
use store::Store;

/// Writes one active stall with a few stocked products.
///
/// The vendor id is freshly generated and logged along with the product
/// ids, so requests can be made against the catalog right away.
pub async fn seed_demo_catalog<S: Store>(store: &S) -> store::Result<(Stall, Vec<ProductStock>)> {
    let vendor = UserId::new();
    let stall = Stall::new(vendor, "Demo produce stall");
    store.put_stall(&stall).await?;

    let products = vec![
        ProductStock::new(stall.id, "Tomatoes (1kg)", Money::from_cents(250), 40),
        ProductStock::new(stall.id, "Fresh cheese", Money::from_cents(900), 12),
        ProductStock::new(stall.id, "Sourdough loaf", Money::from_cents(450), 20),
    ];
    for product in &products {
        store.put_product(product).await?;
        tracing::info!(
            product_id = %product.id,
            name = %product.name,
            price = %product.price,
            stock = product.stock,
            "seeded demo product"
        );
    }

    tracing::info!(stall_id = %stall.id, vendor_id = %vendor, "seeded demo stall");
    Ok((stall, products))
}
