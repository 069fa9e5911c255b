#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use topica::{
    channel::{ancestors_of, is_pattern, CompiledPattern},
    normalize, Message, PubSub,
};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    pattern: String,
    channel: String,
}

fuzz_target!(|input: FuzzInput| {
    // Нормализация не должна паниковать и должна быть идемпотентной.
    let Ok(channel) = normalize(&input.channel) else {
        return;
    };
    assert_eq!(normalize(&channel).ok(), Some(channel.clone()));
    assert_eq!(ancestors_of(&channel).last(), Some("/"));

    if let Ok(pattern) = CompiledPattern::new(&input.pattern) {
        // Полное совпадение всегда влечёт совпадение по префиксу.
        if pattern.matches(&channel) {
            assert!(pattern.matches_descendant_or_self(&channel));
        }
    }

    if !is_pattern(&channel) {
        let pubsub = PubSub::new();
        if pubsub
            .subscribe(input.pattern.as_str(), |_: &Message| {})
            .is_ok()
        {
            let _ = pubsub.publish(channel.as_str(), 0);
            let _ = pubsub.broadcast(channel.as_str(), 0);
        }
    }
});
