//! Cart commands: show, add, remove, clear.

use larder_core::{Cart, Price, ProductId, ProductSnapshot};
use larder_storefront::cart::SyncStatus;
use rust_decimal::Decimal;

use super::{CommandError, Context};

/// Print the cart and its totals.
#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context) {
    ctx.restore().await;
    let sync = ctx.sync();
    println!("Cart ({})", sync.identity());
    print!("{}", render(&sync.cart()));
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns `CommandError` if the ID is blank or the price is not a
/// non-negative decimal.
#[allow(clippy::print_stdout)]
pub async fn add(
    ctx: &Context,
    id: &str,
    title: &str,
    price: &str,
    image: &str,
) -> Result<(), CommandError> {
    let product = ProductSnapshot::new(ProductId::parse(id)?, title, parse_price(price)?, image);
    ctx.restore().await;
    let status = ctx.sync().add_to_cart(&product).await;
    println!("{}", summary(ctx, status));
    Ok(())
}

/// Remove a product line entirely.
///
/// # Errors
///
/// Returns `CommandError` if the ID is blank.
#[allow(clippy::print_stdout)]
pub async fn remove(ctx: &Context, id: &str) -> Result<(), CommandError> {
    let product_id = ProductId::parse(id)?;
    ctx.restore().await;
    let status = ctx.sync().remove_from_cart(&product_id).await;
    println!("{}", summary(ctx, status));
    Ok(())
}

/// Empty the cart.
#[allow(clippy::print_stdout)]
pub async fn clear(ctx: &Context) {
    ctx.restore().await;
    let status = ctx.sync().clear_cart().await;
    println!("{}", summary(ctx, status));
}

fn parse_price(raw: &str) -> Result<Price, CommandError> {
    let amount = raw
        .trim()
        .trim_start_matches('$')
        .parse::<Decimal>()
        .map_err(|e| CommandError::InvalidPrice(format!("{raw}: {e}")))?;
    Ok(Price::new(amount)?)
}

fn summary(ctx: &Context, status: SyncStatus) -> String {
    let sync = ctx.sync();
    let suffix = match status {
        SyncStatus::Local => " (saved on this device)",
        SyncStatus::Synced => "",
        SyncStatus::LocalOnly => " (not synced)",
    };
    format!(
        "{} items, ${:.2}{suffix}",
        sync.total_items(),
        sync.total_price()
    )
}

/// Render cart lines and totals as plain text.
pub fn render(cart: &Cart) -> String {
    if cart.is_empty() {
        return "  (empty)\n".to_string();
    }
    let mut out = String::new();
    for item in cart.items() {
        out.push_str(&format!(
            "  {:<12} {:<28} {:>4} x {:>9} = {:>10}\n",
            item.product_id.as_str(),
            item.title,
            item.quantity,
            item.price.to_string(),
            format!("${:.2}", item.line_total()),
        ));
    }
    out.push_str(&format!(
        "  {} items, total ${:.2}\n",
        cart.total_items(),
        cart.total_price()
    ));
    out
}
