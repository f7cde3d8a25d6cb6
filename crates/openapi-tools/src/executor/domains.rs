//! Built-in mock domains: pizza ordering, pets, weather, products and carts.
//!
//! Prices are kept in integer cents and only converted to decimal amounts when rendered.

use super::mock::{MockContext, MockRegistry, MockRoute, stable_bucket};
use crate::model::HttpMethod;
use serde_json::{Value, json};

pub(crate) fn register_builtin(registry: &mut MockRegistry) {
    registry
        .register("menu", MockRoute::keywords(&["menu"]), pizza_menu)
        .register("track", MockRoute::keywords(&["track"]), track_order)
        .register(
            "order",
            MockRoute::keywords(&["order"]).methods(&[HttpMethod::Post]),
            place_order,
        )
        .register(
            "track",
            MockRoute::keywords(&["order"]).methods(&[HttpMethod::Get]),
            track_order,
        )
        .register(
            "pet_status",
            MockRoute::keywords(&["pet", "status"]).methods(&[HttpMethod::Get]),
            find_pets_by_status,
        )
        .register(
            "pet_add",
            MockRoute::keywords(&["pet"]).methods(&[HttpMethod::Post]),
            add_pet,
        )
        .register(
            "pet_get",
            MockRoute::keywords(&["pet"]).methods(&[HttpMethod::Get]),
            get_pet,
        )
        .register("weather", MockRoute::keywords(&["weather"]), weather)
        .register("weather", MockRoute::keywords(&["forecast"]), weather)
        .register("products", MockRoute::keywords(&["product"]), products)
        .register("cart", MockRoute::keywords(&["cart"]), cart);
}

pub const DEFAULT_SIZE: &str = "medium";
/// Unit price charged for sizes a pizza does not list.
const FALLBACK_UNIT_CENTS: u64 = 1299;

#[derive(Debug)]
pub struct Pizza {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// (size, price in cents)
    pub prices: [(&'static str, u64); 4],
    pub toppings: &'static [&'static str],
}

impl Pizza {
    /// Unit price in cents for `size` (case-insensitive).
    #[must_use]
    pub fn unit_cents(&self, size: &str) -> Option<u64> {
        self.prices
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(size))
            .map(|(_, cents)| *cents)
    }

    fn to_json(&self) -> Value {
        let prices: serde_json::Map<String, Value> = self
            .prices
            .iter()
            .map(|(size, cents)| ((*size).to_string(), json!(dollars(*cents))))
            .collect();
        json!({
            "id": self.id,
            "name": self.name,
            "category": self.category,
            "description": self.description,
            "prices": prices,
            "available": true,
            "toppings": self.toppings,
        })
    }
}

pub static MENU: [Pizza; 5] = [
    Pizza {
        id: "pizza_001",
        name: "Margherita",
        category: "classic",
        description: "Fresh mozzarella, tomato sauce, basil",
        prices: [("small", 899), ("medium", 1199), ("large", 1499), ("xlarge", 1799)],
        toppings: &["mozzarella", "tomato sauce", "basil"],
    },
    Pizza {
        id: "pizza_002",
        name: "Pepperoni",
        category: "classic",
        description: "Pepperoni, mozzarella, tomato sauce",
        prices: [("small", 999), ("medium", 1299), ("large", 1599), ("xlarge", 1899)],
        toppings: &["pepperoni", "mozzarella", "tomato sauce"],
    },
    Pizza {
        id: "pizza_003",
        name: "Hawaiian",
        category: "specialty",
        description: "Ham, pineapple, mozzarella",
        prices: [("small", 1099), ("medium", 1399), ("large", 1699), ("xlarge", 1999)],
        toppings: &["ham", "pineapple", "mozzarella"],
    },
    Pizza {
        id: "pizza_004",
        name: "Veggie Supreme",
        category: "vegetarian",
        description: "Bell peppers, onions, mushrooms, olives",
        prices: [("small", 1099), ("medium", 1399), ("large", 1699), ("xlarge", 1999)],
        toppings: &["bell peppers", "onions", "mushrooms", "olives", "mozzarella"],
    },
    Pizza {
        id: "pizza_005",
        name: "Meat Lovers",
        category: "specialty",
        description: "Pepperoni, sausage, bacon, ham",
        prices: [("small", 1199), ("medium", 1499), ("large", 1799), ("xlarge", 2099)],
        toppings: &["pepperoni", "sausage", "bacon", "ham", "mozzarella"],
    },
];

/// Look up a pizza by id or (case-insensitive) name.
#[must_use]
pub fn find_pizza(key: &str) -> Option<&'static Pizza> {
    let key = key.trim();
    MENU.iter()
        .find(|p| p.id.eq_ignore_ascii_case(key) || p.name.eq_ignore_ascii_case(key))
}

#[allow(clippy::cast_precision_loss)]
fn dollars(cents: u64) -> f64 {
    cents as f64 / 100.0
}

fn pizza_menu(ctx: &MockContext<'_>) -> Value {
    let category = ctx.str_arg(&["category"]);
    let pizzas: Vec<Value> = MENU
        .iter()
        .filter(|p| {
            category
                .as_deref()
                .is_none_or(|c| p.category.eq_ignore_ascii_case(c))
        })
        .map(Pizza::to_json)
        .collect();
    json!({
        "total": pizzas.len(),
        "pizzas": pizzas,
    })
}

fn place_order(ctx: &MockContext<'_>) -> Value {
    let order_id = format!("ORD-{}", ctx.next_id());
    let requested = ctx.str_arg(&["pizza_id", "pizzaId", "pizza", "pizza_name", "pizzaName"]);
    let pizza = requested.as_deref().and_then(find_pizza);
    let size = ctx
        .str_arg(&["size"])
        .map_or_else(|| DEFAULT_SIZE.to_string(), |s| s.to_ascii_lowercase());
    // Absent means one; anything other than a positive whole number is rejected.
    let requested_quantity = ctx.arg(&["quantity", "qty"]);
    let quantity = match requested_quantity {
        None => Some(1),
        Some(_) => ctx.u64_arg(&["quantity", "qty"]).filter(|q| *q > 0),
    };
    let billed = quantity.unwrap_or(0);

    let unit_cents = pizza.map_or(0, |p| p.unit_cents(&size).unwrap_or(FALLBACK_UNIT_CENTS));
    let total_cents = unit_cents.saturating_mul(billed);
    let status = match (pizza, quantity) {
        (None, _) => "unavailable",
        (Some(_), None) => "invalid_quantity",
        (Some(_), Some(_)) => "confirmed",
    };

    json!({
        "order_id": order_id,
        "status": status,
        "pizza": pizza.map_or_else(
            || requested.clone().unwrap_or_else(|| "Unknown".to_string()),
            |p| p.name.to_string(),
        ),
        "pizza_id": pizza.map(|p| p.id),
        "size": size,
        "quantity": quantity.map_or_else(
            || requested_quantity.cloned().unwrap_or(Value::Null),
            Value::from,
        ),
        "unit_price": dollars(unit_cents),
        "total_price": dollars(total_cents),
        "customer_name": ctx.str_arg(&["customer_name", "customerName", "name"]),
        "delivery_address": ctx.str_arg(&["address", "delivery_address", "deliveryAddress"]),
        "phone": ctx.str_arg(&["phone"]),
        "extra_toppings": ctx.arg(&["extra_toppings", "extraToppings", "toppings"])
            .cloned()
            .unwrap_or_else(|| json!([])),
        "estimated_delivery_minutes": 25 + 5 * billed.min(4),
    })
}

/// Statuses an in-flight order can report; `delivered` is never reported by tracking.
pub const ORDER_STATUSES: [&str; 5] = [
    "preparing",
    "baking",
    "quality_check",
    "out_for_delivery",
    "delivered",
];

fn track_order(ctx: &MockContext<'_>) -> Value {
    let order_id = ctx
        .str_arg(&["orderId", "order_id", "id"])
        .unwrap_or_else(|| "ORD-1000".to_string());
    #[allow(clippy::cast_possible_truncation)]
    let stage = stable_bucket(&order_id, 4) as usize;
    let status = ORDER_STATUSES[stage];

    let history: Vec<Value> = std::iter::once("confirmed")
        .chain(ORDER_STATUSES[..=stage].iter().copied())
        .map(|s| json!({ "status": s }))
        .collect();

    json!({
        "order_id": order_id,
        "status": status,
        "status_history": history,
        "estimated_delivery_minutes": 5 * (4 - stage as u64) + 5,
        "driver": (status == "out_for_delivery")
            .then(|| json!({ "name": "John Doe", "phone": "+1-555-0123" })),
    })
}

fn add_pet(ctx: &MockContext<'_>) -> Value {
    json!({
        "id": ctx.next_id(),
        "name": ctx.str_arg(&["name"]),
        "photoUrls": ctx.arg(&["photoUrls"]).cloned().unwrap_or_else(|| json!([])),
        "status": ctx.str_arg(&["status"]).unwrap_or_else(|| "available".to_string()),
        "category": ctx.arg(&["category"]).cloned().unwrap_or_else(|| json!({ "id": 1, "name": "Dogs" })),
        "tags": ctx.arg(&["tags"]).cloned().unwrap_or_else(|| json!([])),
    })
}

fn get_pet(ctx: &MockContext<'_>) -> Value {
    let pet_id = ctx
        .arg(&["petId", "pet_id", "id"])
        .cloned()
        .unwrap_or_else(|| json!(1));
    let label = crate::binder::value_to_string(&pet_id);
    json!({
        "id": pet_id,
        "name": format!("Pet_{label}"),
        "photoUrls": [format!("https://example.com/photo{label}.jpg")],
        "status": "available",
        "category": { "id": 1, "name": "Dogs" },
    })
}

fn find_pets_by_status(ctx: &MockContext<'_>) -> Value {
    let status = ctx
        .str_arg(&["status"])
        .or_else(|| {
            ctx.arg(&["status"])
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "available".to_string());
    json!([
        { "id": 1, "name": "Buddy", "status": status },
        { "id": 2, "name": "Max", "status": status },
        { "id": 3, "name": "Luna", "status": status },
    ])
}

const CONDITIONS: [&str; 4] = ["Sunny", "Partly Cloudy", "Cloudy", "Light Rain"];

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
fn weather(ctx: &MockContext<'_>) -> Value {
    let location = ctx
        .str_arg(&["location", "city", "q"])
        .unwrap_or_else(|| "Unknown".to_string());
    let units = ctx
        .str_arg(&["units"])
        .unwrap_or_else(|| "metric".to_string());
    let seed = location.to_ascii_lowercase();

    let temperature = if units.eq_ignore_ascii_case("imperial") {
        60 + stable_bucket(&format!("{seed}:temp"), 26) as i64
    } else {
        15 + stable_bucket(&format!("{seed}:temp"), 16) as i64
    };
    let feels_like = temperature + stable_bucket(&format!("{seed}:feels"), 7) as i64 - 3;

    json!({
        "location": location,
        "units": units,
        "current": {
            "temperature": temperature,
            "feels_like": feels_like,
            "humidity": 40 + stable_bucket(&format!("{seed}:humidity"), 41),
            "description": CONDITIONS[stable_bucket(&format!("{seed}:sky"), 4) as usize],
            "wind_speed": 5 + stable_bucket(&format!("{seed}:wind"), 16),
        },
    })
}

const PRODUCTS: [(&str, &str, u64, &str); 4] = [
    ("prod_1", "Laptop", 99_999, "electronics"),
    ("prod_2", "Headphones", 7_999, "electronics"),
    ("prod_3", "T-Shirt", 1_999, "clothing"),
    ("prod_4", "Coffee Maker", 4_999, "home"),
];

fn products(ctx: &MockContext<'_>) -> Value {
    let category = ctx.str_arg(&["category"]);
    let items: Vec<Value> = PRODUCTS
        .iter()
        .filter(|(_, _, _, c)| category.as_deref().is_none_or(|want| c.eq_ignore_ascii_case(want)))
        .map(|(id, name, cents, c)| {
            json!({ "id": id, "name": name, "price": dollars(*cents), "category": c })
        })
        .collect();
    json!({
        "page": ctx.u64_arg(&["page"]).unwrap_or(1),
        "limit": ctx.u64_arg(&["limit"]).unwrap_or(20),
        "total": items.len(),
        "products": items,
    })
}

fn cart(ctx: &MockContext<'_>) -> Value {
    let quantity = ctx.u64_arg(&["quantity", "qty"]).unwrap_or(1);
    json!({
        "cart_id": format!("cart_{}", ctx.next_id()),
        "items": [{
            "product_id": ctx.str_arg(&["product_id", "productId"]),
            "quantity": quantity,
        }],
        "total_items": quantity,
    })
}
