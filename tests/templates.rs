//! Splices the shipped 8086 table into the shipped templates.

extern crate dispatchgen;

use dispatchgen::compiler::{compile_str, render};
use dispatchgen::template::{extract_template, insert_code, Document};

static TABLE: &str = include_str!("../tables/8086.txt");
static DISPATCH: &str = include_str!("../templates/dispatch.rs.template");
static HANDLERS: &str = include_str!("../templates/handlers.rs.template");

#[test]
fn generate_and_extract() {
    let compiled = compile_str(TABLE).unwrap();
    let dispatch = render::render_dispatch(&compiled);
    let handlers = render::render_handlers(&compiled.handlers);

    let generated = insert_code(DISPATCH, "dispatch", &dispatch).unwrap();
    assert!(generated.contains("        // BEGIN GENERATED CODE: dispatch\n        match self.opcode {\n"));
    assert!(generated.contains("            0x00 => {  // ADD Eb, Gb\n"));
    assert!(generated.contains("            _ => self.invalid_opcode(),\n        }\n        // END GENERATED CODE: dispatch\n"));
    assert_eq!(extract_template(&generated).unwrap(), DISPATCH);

    let generated = insert_code(HANDLERS, "handlers", &handlers).unwrap();
    assert!(generated.contains("    fn add_b(&mut self) { self.not_implemented(\"ADD_b\"); }\n"));
    assert!(generated.contains("    fn es_(&mut self) {}\n"));
    assert!(generated.contains("    fn nop(&mut self) {}\n"));
    assert_eq!(extract_template(&generated).unwrap(), HANDLERS);

    // regenerating a generated file is a no-op
    assert_eq!(insert_code(&generated, "handlers", &handlers).unwrap(), generated);
}

#[test]
fn templates_have_one_region_each() {
    let names = |text| {
        Document::parse(text)
            .unwrap()
            .regions()
            .map(|r| r.name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(DISPATCH), vec!["dispatch"]);
    assert_eq!(names(HANDLERS), vec!["handlers"]);
}
