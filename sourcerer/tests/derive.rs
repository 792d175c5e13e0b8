#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use sourcerer::aggregate::DomainEvent;
use sourcerer::topic::Topic;
use sourcerer_derive::Event;

#[derive(Clone, Debug, Serialize, Deserialize, Event)]
enum CustomEvent {
    Something,
    #[event(topic = "custom::v2::Else")]
    Else { amount: u64 },
}

#[test]
fn a_variant_without_an_override_gets_a_default_topic() {
    assert_eq!(CustomEvent::Something.topic(), Topic("event::CustomEvent::Something"));
}

#[test]
fn an_override_wins_over_the_default() {
    assert_eq!(CustomEvent::Else { amount: 5 }.topic(), Topic("custom::v2::Else"));
}

#[test]
fn topics_are_stable_regardless_of_field_values() {
    assert_eq!(
        CustomEvent::Else { amount: 1 }.topic(),
        CustomEvent::Else { amount: 2 }.topic()
    );
}
