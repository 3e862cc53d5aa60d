//! Receipt rendering.
//!
//! Receipts are drawn from the order as it was persisted, never from the
//! till's cart, so a printed or messaged receipt always matches the stored
//! order.

use rust_decimal::Decimal;
use crate::domain::aggregates::{Order, OrderLine};
use crate::domain::totals::DiscountKind;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct ReceiptSettings {
    pub store_name: String,
    pub currency: String,
    pub footer: Option<String>,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self { store_name: "OpenSASE POS".to_string(), currency: "INR".to_string(), footer: Some("Thank you for shopping with us!".to_string()) }
    }
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn money(value: Decimal, currency: &str) -> String { Money::new(value, currency).to_string() }

fn discount_label(order: &Order) -> String {
    match order.discount_kind {
        DiscountKind::Percentage => format!("Discount ({}%)", order.discount_value.normalize()),
        DiscountKind::Amount => "Discount".to_string(),
    }
}

fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
body {{ font-family: ui-monospace, Menlo, monospace; margin: 0; padding: 16px; color: #111; max-width: 420px; }}
table {{ width: 100%; border-collapse: collapse; font-size: 12px; }}
th, td {{ padding: 4px 0; text-align: left; }}
td.num, th.num {{ text-align: right; }}
.section {{ margin-top: 10px; border-top: 1px dashed #111; padding-top: 6px; }}
.line {{ display: flex; justify-content: space-between; font-size: 12px; }}
.grand {{ font-weight: bold; font-size: 14px; }}
.center {{ text-align: center; }}
</style>
</head>
<body>{}</body>
</html>"#,
        esc(title),
        body
    )
}

fn pair(label: &str, value: &str) -> String {
    format!("<div class=\"line\"><span>{}</span><span>{}</span></div>", esc(label), esc(value))
}

/// Full HTML document, used for the print view and as an email body.
pub fn render_html(order: &Order, lines: &[OrderLine], settings: &ReceiptSettings) -> String {
    let cur = settings.currency.as_str();
    let mut body = format!("<h2 class=\"center\">{}</h2>", esc(&settings.store_name));

    body.push_str("<div class=\"section\">");
    body.push_str(&pair("Invoice", &order.order_number));
    body.push_str(&pair("Date", &order.created_at.format("%d %b %Y %H:%M").to_string()));
    if let Some(name) = order.contact.name.as_deref() {
        body.push_str(&pair("Customer", name));
    }
    if let Some(phone) = order.contact.phone.as_deref() {
        body.push_str(&pair("Phone", phone));
    }
    body.push_str(&pair("Payment", order.payment_method.as_str()));
    body.push_str("</div>");

    body.push_str("<div class=\"section\"><table><thead><tr><th>Item</th><th class=\"num\">Qty</th><th class=\"num\">Price</th><th class=\"num\">Tax</th><th class=\"num\">Total</th></tr></thead><tbody>");
    for line in lines {
        body.push_str(&format!(
            "<tr><td>{}</td><td class=\"num\">{} {}</td><td class=\"num\">{:.2}</td><td class=\"num\">{:.2}</td><td class=\"num\">{:.2}</td></tr>",
            esc(&line.product_name), line.quantity, esc(&line.unit), line.unit_price, line.tax_amount, line.line_total
        ));
    }
    body.push_str("</tbody></table></div>");

    body.push_str("<div class=\"section\">");
    body.push_str(&pair("Subtotal", &money(order.subtotal, cur)));
    body.push_str(&pair("Tax", &money(order.tax, cur)));
    if order.discount > Decimal::ZERO {
        body.push_str(&pair(&discount_label(order), &format!("- {}", money(order.discount, cur))));
    }
    body.push_str(&format!("<div class=\"line grand\"><span>Total</span><span>{}</span></div>", esc(&money(order.total, cur))));
    body.push_str("</div>");

    if let Some(footer) = settings.footer.as_deref() {
        body.push_str(&format!("<p class=\"center\">{}</p>", esc(footer)));
    }
    html_shell(&format!("Invoice {}", order.order_number), &body)
}

/// Short plain-text receipt for SMS and WhatsApp bodies.
pub fn render_text(order: &Order, lines: &[OrderLine], settings: &ReceiptSettings) -> String {
    let cur = settings.currency.as_str();
    let mut out = format!("{}\nInvoice {}\n", settings.store_name, order.order_number);
    if let Some(name) = order.contact.name.as_deref() {
        out.push_str(&format!("Customer: {name}\n"));
    }
    out.push('\n');
    for line in lines {
        out.push_str(&format!("{} x{} = {:.2}\n", line.product_name, line.quantity, line.line_total));
    }
    out.push_str(&format!("\nSubtotal: {}\nTax: {}\n", money(order.subtotal, cur), money(order.tax, cur)));
    if order.discount > Decimal::ZERO {
        out.push_str(&format!("{}: -{}\n", discount_label(order), money(order.discount, cur)));
    }
    out.push_str(&format!("Total: {}\n", money(order.total, cur)));
    if let Some(footer) = settings.footer.as_deref() {
        out.push_str(&format!("\n{footer}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, PaymentMethod, Product};
    use crate::domain::totals::{Discount, Totals};
    use crate::domain::value_objects::{Sku, TaxRate};

    fn placed(discount: Discount) -> (Order, Vec<OrderLine>) {
        let mut cart = Cart::new();
        let p = Product::create(Sku::new("TEA-1").unwrap(), "Masala <Chai>", Decimal::new(100, 0)).with_stock(4);
        let id = p.id;
        cart.add(p, TaxRate::new(Decimal::new(18, 0)).unwrap()).unwrap();
        cart.set_quantity(id, 2).unwrap();
        let totals = Totals::calculate(cart.lines(), &discount);
        let mut order = Order::place_pos(&totals, discount.kind(), discount.value(), PaymentMethod::Upi);
        order.contact.name = Some("Asha & Co".to_string());
        let lines = cart.lines().iter().map(|l| OrderLine::snapshot(order.id, l)).collect();
        (order, lines)
    }

    #[test]
    fn test_html_escapes_and_shows_totals() {
        let (order, lines) = placed(Discount::percentage(Decimal::new(10, 0)).unwrap());
        let html = render_html(&order, &lines, &ReceiptSettings::default());
        assert!(html.contains("Masala &lt;Chai&gt;"));
        assert!(html.contains("Asha &amp; Co"));
        assert!(html.contains("Discount (10%)"));
        assert!(html.contains("INR 216.00"));
        assert!(html.contains(&order.order_number));
    }

    #[test]
    fn test_text_omits_zero_discount() {
        let (order, lines) = placed(Discount::none());
        let text = render_text(&order, &lines, &ReceiptSettings::default());
        assert!(text.contains("Masala <Chai> x2 = 236.00"));
        assert!(text.contains("Total: INR 236.00"));
        assert!(!text.contains("Discount"));
    }
}
