use islands_wasm::{IslandsRuntime, transform};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

#[derive(Deserialize, Debug)]
struct TransformResult {
    code: String,
    map: Option<String>,
    container: JsonValue,
    diagnostics: Vec<String>,
}

const COUNTER: &str = "<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\n# Counter\n\n<Counter client:load initial=\"3\" />\n";

fn to_js(value: &JsonValue) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .expect("serialize input")
}

fn effects(value: JsValue) -> Vec<JsonValue> {
    serde_wasm_bindgen::from_value(value).expect("deserialize effects")
}

#[wasm_bindgen_test]
fn transform_rewrites_counter() {
    let result = transform(COUNTER, "docs/counter.md", JsValue::UNDEFINED).expect("transform");
    let result: TransformResult = serde_wasm_bindgen::from_value(result).expect("deserialize");

    assert!(result.code.contains(
        "<div data-render-id=\"5a6cfaa6\" data-render-directive=\"client:load\" data-render-component=\"Counter\" data-spa-sync=\"true\" initial=\"3\"></div>"
    ));
    assert!(!result.code.contains("<script"));
    assert!(result.map.is_some());
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.container["containers"][0]["renderId"], "5a6cfaa6");
}

#[wasm_bindgen_test]
fn transform_reports_authoring_diagnostics() {
    let source = COUNTER.replace("<Counter client:load initial=\"3\" />", "<counter />");
    let result = transform(&source, "page.md", JsValue::UNDEFINED).expect("transform");
    let result: TransformResult = serde_wasm_bindgen::from_value(result).expect("deserialize");
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.code.contains("<counter />"));
}

#[wasm_bindgen_test]
fn transform_honors_framework_tag() {
    let source = COUNTER.replace("lang=\"react\"", "lang=\"vue\"");
    let config = to_js(&json!({ "frameworkTag": "vue" }));
    let result = transform(&source, "page.md", config).expect("transform");
    let result: TransformResult = serde_wasm_bindgen::from_value(result).expect("deserialize");
    assert_eq!(result.container["containers"].as_array().map(Vec::len), Some(1));
}

#[wasm_bindgen_test]
fn transform_rejects_malformed_config() {
    let config = to_js(&json!({ "frameworkTag": 3 }));
    assert!(transform(COUNTER, "page.md", config).is_err());
}

#[wasm_bindgen_test]
fn runtime_hydrates_counter() {
    let result = transform(COUNTER, "docs/counter.md", JsValue::UNDEFINED).expect("transform");
    let result: TransformResult = serde_wasm_bindgen::from_value(result).expect("deserialize");

    let mut runtime = IslandsRuntime::new();
    let first = effects(runtime.discover(to_js(&result.container)).expect("discover"));
    assert_eq!(first[0]["effect"], "loadFramework");
    assert_eq!(first[1]["effect"], "loadModule");
    assert_eq!(first[1]["key"], "./Counter.tsx#default");

    runtime
        .handle(to_js(&json!({ "event": "frameworkLoaded" })))
        .expect("framework loaded");
    let mounted = effects(
        runtime
            .handle(to_js(&json!({ "event": "moduleLoaded", "key": "./Counter.tsx#default" })))
            .expect("module loaded"),
    );
    assert_eq!(mounted.len(), 1);
    assert_eq!(mounted[0]["effect"], "hydrate");
    assert_eq!(mounted[0]["props"], json!({ "initial": "3" }));
    assert_eq!(runtime.page_id(), "docs/counter.md");
}

#[wasm_bindgen_test]
fn runtime_reuses_node_after_prose_edit() {
    let compile = |source: &str| -> JsonValue {
        let result = transform(source, "docs/counter.md", JsValue::UNDEFINED).expect("transform");
        let result: TransformResult = serde_wasm_bindgen::from_value(result).expect("deserialize");
        result.container
    };

    let mut runtime = IslandsRuntime::new();
    runtime.discover(to_js(&compile(COUNTER))).expect("discover");

    let edited = compile(&COUNTER.replace("# Counter", "# Counter demo"));
    let plan = effects(runtime.apply_edit(to_js(&edited), JsValue::UNDEFINED).expect("apply"));
    assert_eq!(plan, vec![json!({ "effect": "reuseNode", "renderId": "5a6cfaa6" })]);
}
