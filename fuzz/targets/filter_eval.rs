#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use topica::Filter;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    filter: String,
    data: String,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(filter) = serde_json::from_str::<Value>(&input.filter) else {
        return;
    };
    let Ok(data) = serde_json::from_str::<Value>(&input.data) else {
        return;
    };

    // Компиляция и проверка фильтра не должны паниковать ни на каком JSON.
    if let Ok(compiled) = Filter::from_value(filter.clone()) {
        let _ = compiled.passes(&data);
        assert_eq!(compiled.as_value(), filter);
    }
});
