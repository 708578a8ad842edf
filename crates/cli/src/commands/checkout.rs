//! Checkout command.

use larder_core::CheckoutStep;
use larder_storefront::cart::SyncStatus;

use super::cart::render;
use super::{CommandError, Context};

/// Walk the checkout steps for the current cart and place the order.
///
/// # Errors
///
/// Returns `CommandError::Checkout` if the cart is empty.
#[allow(clippy::print_stdout)]
pub async fn run(ctx: &Context) -> Result<(), CommandError> {
    ctx.restore().await;
    let sync = ctx.sync();

    let mut checkout = sync.begin_checkout()?;
    println!("Checkout for {}", sync.identity());
    print!("{}", render(&sync.cart()));

    while checkout.step() != CheckoutStep::Review {
        println!("  step: {}", checkout.step());
        checkout.advance()?;
    }
    println!("  step: {}", checkout.step());

    match sync.complete_checkout(&mut checkout).await? {
        SyncStatus::LocalOnly => println!("Order placed; the saved cart could not be cleared"),
        SyncStatus::Local | SyncStatus::Synced => println!("Order placed"),
    }
    Ok(())
}
