#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use villaops_lib::bookings::{self, Booking, BookingInput};
use villaops_lib::properties::{self, Property, PropertyInput};
use villaops_lib::Store;

pub async fn temp_store() -> Store {
    Store::in_memory().await.expect("open in-memory store")
}

pub async fn property(store: &Store, name: &str) -> Property {
    properties::create(store, &PropertyInput::named(name))
        .await
        .expect("create property")
}

pub async fn listed_property(store: &Store, name: &str, listing_id: &str) -> Property {
    let input = PropertyInput {
        guesty_listing_id: Some(listing_id.to_string()),
        ..PropertyInput::named(name)
    };
    properties::create(store, &input).await.expect("create property")
}

pub async fn booking(store: &Store, property_id: &str, check_in: &str, check_out: &str) -> Booking {
    let input = BookingInput {
        property_id: property_id.to_string(),
        guest_name: "Test Guest".into(),
        check_in: check_in.into(),
        check_out: check_out.into(),
        ..BookingInput::default()
    };
    bookings::create(store, &input).await.expect("create booking")
}
