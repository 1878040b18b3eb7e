//! Cart reconciliation core.
//!
//! Two sources of truth exist for a shopper's cart: the `cart-items`
//! cookie (anonymous sessions) and the database cart (signed-in users).
//! This module plans how the two merge on auth transitions and how a
//! line moves between sizes. It is deliberately free of I/O; the cart
//! service applies the resulting mutations inside one transaction.
//!
//! Two distinct merge policies coexist on purpose:
//! - adding to the cart is *additive* (the shopper asked for more), and
//! - the login sync is *last-write-wins* per size (the cookie is the
//!   fresher view of what the anonymous session wanted).

use std::collections::HashMap;

use uuid::Uuid;

/// Guest cart as carried by the `cart-items` cookie: size id -> quantity.
///
/// This is the canonical flat shape; size ids are only resolved against
/// the catalog when the cookie is read.
pub type GuestCart = HashMap<Uuid, u32>;

/// One write the reconciler wants applied to the database cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartMutation {
    Insert { size_id: Uuid, quantity: u32 },
    SetQuantity { size_id: Uuid, quantity: u32 },
}

impl CartMutation {
    pub fn size_id(&self) -> Uuid {
        match self {
            Self::Insert { size_id, .. } | Self::SetQuantity { size_id, .. } => *size_id,
        }
    }
}

/// Plan the login-time merge of a cookie cart into a database cart.
///
/// For every `(size, quantity)` pair in the cookie: overwrite the stored
/// quantity when it differs, insert when the size is absent, and leave
/// matching lines alone. Database lines the cookie does not mention are
/// kept as they are. Zero/absent cookie quantities produce no mutation.
pub fn reconcile(db: &HashMap<Uuid, u32>, cookie: &GuestCart) -> Vec<CartMutation> {
    let mut plan: Vec<CartMutation> = cookie
        .iter()
        .filter(|(_, &qty)| qty > 0)
        .filter_map(|(&size_id, &qty)| match db.get(&size_id) {
            None => Some(CartMutation::Insert { size_id, quantity: qty }),
            Some(&existing) if existing != qty => {
                Some(CartMutation::SetQuantity { size_id, quantity: qty })
            }
            Some(_) => None,
        })
        .collect();
    // Deterministic application order; map iteration order is not.
    plan.sort_by_key(CartMutation::size_id);
    plan
}

/// Outcome of re-pointing a cart line from one size to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeChange {
    /// No line exists at the target size; move the line over.
    Repoint,
    /// A line already exists at the target size; fold the moving line
    /// into it with the summed quantity and drop the old line.
    MergeInto { quantity: u32 },
}

/// Plan a size change for a line of `moving_qty`, given the quantity
/// already in the cart at the target size (if any). Quantities sum on
/// merge; clamping to stock is left to display layers.
pub fn plan_size_change(moving_qty: u32, existing_at_target: Option<u32>) -> SizeChange {
    match existing_at_target {
        Some(existing) => SizeChange::MergeInto { quantity: existing.saturating_add(moving_qty) },
        None => SizeChange::Repoint,
    }
}

/// Additive add-to-cart: a repeated add for the same size accumulates.
pub fn guest_add(cart: &mut GuestCart, size_id: Uuid, quantity: u32) {
    if quantity == 0 {
        return;
    }
    *cart.entry(size_id).or_insert(0) += quantity;
}

/// Set a line's quantity outright; zero removes the line.
pub fn guest_update(cart: &mut GuestCart, size_id: Uuid, quantity: u32) {
    if quantity == 0 {
        cart.remove(&size_id);
    } else {
        cart.insert(size_id, quantity);
    }
}

/// Returns whether a line was actually present.
pub fn guest_remove(cart: &mut GuestCart, size_id: Uuid) -> bool {
    cart.remove(&size_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn add_twice_accumulates() {
        let mut cart = GuestCart::new();
        guest_add(&mut cart, sid(1), 2);
        guest_add(&mut cart, sid(1), 3);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[&sid(1)], 5);
    }

    #[test]
    fn add_zero_is_noop() {
        let mut cart = GuestCart::new();
        guest_add(&mut cart, sid(1), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn update_to_zero_removes_line() {
        let mut cart = GuestCart::new();
        guest_add(&mut cart, sid(1), 4);
        guest_update(&mut cart, sid(1), 0);
        assert!(!cart.contains_key(&sid(1)));
    }

    #[test]
    fn update_sets_not_adds() {
        let mut cart = GuestCart::new();
        guest_add(&mut cart, sid(1), 4);
        guest_update(&mut cart, sid(1), 2);
        assert_eq!(cart[&sid(1)], 2);
    }

    #[test]
    fn remove_reports_presence() {
        let mut cart = GuestCart::new();
        guest_add(&mut cart, sid(1), 1);
        assert!(guest_remove(&mut cart, sid(1)));
        assert!(!guest_remove(&mut cart, sid(1)));
    }

    #[test]
    fn size_change_merges_by_summing() {
        // Line at A with qty 2, line at B with qty 3: A -> B leaves one
        // line at B with qty 5.
        assert_eq!(plan_size_change(2, Some(3)), SizeChange::MergeInto { quantity: 5 });
    }

    #[test]
    fn size_change_without_target_repoints() {
        assert_eq!(plan_size_change(2, None), SizeChange::Repoint);
    }

    #[test]
    fn reconcile_into_empty_cart_inserts_cookie_lines() {
        // Boundary case: overwrite and additive semantics coincide when
        // the database cart starts empty.
        let db = HashMap::new();
        let cookie = GuestCart::from([(sid(123), 2)]);
        let plan = reconcile(&db, &cookie);
        assert_eq!(plan, vec![CartMutation::Insert { size_id: sid(123), quantity: 2 }]);
    }

    #[test]
    fn reconcile_overwrites_conflicting_quantity() {
        let db = HashMap::from([(sid(1), 5)]);
        let cookie = GuestCart::from([(sid(1), 2)]);
        let plan = reconcile(&db, &cookie);
        // Cookie wins: quantity becomes 2, not 7.
        assert_eq!(plan, vec![CartMutation::SetQuantity { size_id: sid(1), quantity: 2 }]);
    }

    #[test]
    fn reconcile_skips_matching_and_keeps_unmentioned() {
        let db = HashMap::from([(sid(1), 2), (sid(2), 9)]);
        let cookie = GuestCart::from([(sid(1), 2), (sid(3), 1)]);
        let plan = reconcile(&db, &cookie);
        assert_eq!(plan, vec![CartMutation::Insert { size_id: sid(3), quantity: 1 }]);
    }

    #[test]
    fn reconcile_ignores_zero_quantities() {
        let db = HashMap::new();
        let cookie = GuestCart::from([(sid(1), 0)]);
        assert!(reconcile(&db, &cookie).is_empty());
    }

    #[test]
    fn reconcile_plan_order_is_deterministic() {
        let db = HashMap::new();
        let cookie = GuestCart::from([(sid(9), 1), (sid(3), 1), (sid(7), 1)]);
        let ids: Vec<_> = reconcile(&db, &cookie).iter().map(CartMutation::size_id).collect();
        assert_eq!(ids, vec![sid(3), sid(7), sid(9)]);
    }
}
