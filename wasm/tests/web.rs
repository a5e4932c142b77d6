//! Browser-side checks of the exported bindings

#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;

use timber_grain_wasm::allowed_actions;

#[wasm_bindgen_test]
fn test_allowed_actions_for_worker() {
    let actions = allowed_actions("factory_worker", "created").unwrap();
    assert_eq!(actions.length(), 1);
    assert_eq!(actions.get(0).as_string().as_deref(), Some("take_order"));
}

#[wasm_bindgen_test]
fn test_unknown_role_rejected() {
    assert!(allowed_actions("carpenter", "created").is_err());
}
