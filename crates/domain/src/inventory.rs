//! Stock reservation rules.
//!
//! The store locks product rows and hands them here; [`reserve`] decides
//! whether the cart fits and decrements the locked copies. Writing the new
//! stock back happens in the same transaction.

use std::collections::HashMap;

use common::{Money, ProductId, StallId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A vendor's market stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stall {
    pub id: StallId,
    pub vendor_id: UserId,
    pub name: String,
    pub active: bool,
}

impl Stall {
    pub fn new(vendor_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: StallId::new(),
            vendor_id,
            name: name.into(),
            active: true,
        }
    }
}

/// A product row as seen by checkout, joined with its stall's active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub id: ProductId,
    pub stall_id: StallId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub active: bool,
    pub stall_active: bool,
}

impl ProductStock {
    pub fn new(stall_id: StallId, name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            stall_id,
            name: name.into(),
            price,
            stock,
            active: true,
            stall_active: true,
        }
    }

    /// Returns true if the product can be sold.
    pub fn is_available(&self) -> bool {
        self.active && self.stall_active
    }
}

/// One requested cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Stock taken for one cart line, with the price captured at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Position of the line in the submitted cart.
    pub index: usize,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Errors raised while reserving stock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for item {index}: requested {requested}, available {available}")]
    InsufficientStock {
        index: usize,
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("Product for item {index} is not available")]
    ProductUnavailable { index: usize, product_id: ProductId },
}

impl InventoryError {
    /// Returns the cart index the error refers to.
    pub fn index(&self) -> usize {
        match self {
            InventoryError::InsufficientStock { index, .. }
            | InventoryError::ProductUnavailable { index, .. } => *index,
        }
    }
}

/// Reserves stock for every cart line against the locked product rows.
///
/// Lines naming the same product draw from the same stock, so the check is
/// cumulative. On error `products` may be partially decremented; callers
/// discard it with the transaction.
pub fn reserve(
    lines: &[CartLine],
    products: &mut HashMap<ProductId, ProductStock>,
) -> Result<Vec<Reservation>, InventoryError> {
    let mut reservations = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let product = match products.get_mut(&line.product_id) {
            Some(product) if product.is_available() => product,
            _ => {
                return Err(InventoryError::ProductUnavailable {
                    index,
                    product_id: line.product_id,
                });
            }
        };

        if product.stock < line.quantity {
            return Err(InventoryError::InsufficientStock {
                index,
                product_id: line.product_id,
                available: product.stock,
                requested: line.quantity,
            });
        }

        product.stock -= line.quantity;
        reservations.push(Reservation {
            index,
            product_id: product.id,
            quantity: line.quantity,
            unit_price: product.price,
        });
    }

    Ok(reservations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(stock: u32) -> (ProductStock, HashMap<ProductId, ProductStock>) {
        let product = ProductStock::new(StallId::new(), "Tomatoes", Money::from_cents(200), stock);
        let mut map = HashMap::new();
        map.insert(product.id, product.clone());
        (product, map)
    }

    #[test]
    fn reserve_decrements_stock_and_captures_price() {
        let (product, mut products) = catalog(5);
        let reservations = reserve(&[CartLine::new(product.id, 2)], &mut products).unwrap();

        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].unit_price, Money::from_cents(200));
        assert_eq!(products[&product.id].stock, 3);
    }

    #[test]
    fn repeated_product_is_checked_cumulatively() {
        let (product, mut products) = catalog(3);
        let lines = [CartLine::new(product.id, 2), CartLine::new(product.id, 2)];

        let err = reserve(&lines, &mut products).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                index: 1,
                product_id: product.id,
                available: 1,
                requested: 2,
            }
        );
    }

    #[test]
    fn missing_product_is_unavailable() {
        let (_, mut products) = catalog(3);
        let missing = ProductId::new();
        let err = reserve(&[CartLine::new(missing, 1)], &mut products).unwrap_err();
        assert_eq!(err.index(), 0);
        assert!(matches!(err, InventoryError::ProductUnavailable { .. }));
    }

    #[test]
    fn inactive_stall_makes_product_unavailable() {
        let (product, mut products) = catalog(3);
        products.get_mut(&product.id).unwrap().stall_active = false;
        let err = reserve(&[CartLine::new(product.id, 1)], &mut products).unwrap_err();
        assert!(matches!(err, InventoryError::ProductUnavailable { index: 0, .. }));
    }

    #[test]
    fn exact_stock_is_allowed() {
        let (product, mut products) = catalog(2);
        reserve(&[CartLine::new(product.id, 2)], &mut products).unwrap();
        assert_eq!(products[&product.id].stock, 0);
    }
}
