//! Runs a page of toys against the in-memory document: build the article
//! markup, scroll everything into view, submit each toy once, report what
//! each output region shows.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::dom::{Dom, DomError, MemoryDocument, NodeId};
use crate::net::{Fetch, StaticFetch};
use crate::session::{ComponentDescriptor, RuntimeError, ToyRuntime};
use crate::toy::{ModuleLoader, ModuleRegistry, ToyError, ToyModule};

pub const INPUT_METHODS: [&str; 6] = [
    "text",
    "textarea",
    "number",
    "kv",
    "dendrite-story",
    "dendrite-page",
];

pub const OUTPUT_PRESENTERS: [&str; 2] = ["text", "pre"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub articles: Vec<ArticleEntry>,
    /// Canned bodies by URL. When present no real network request is made.
    #[serde(default)]
    pub responses: BTreeMap<String, String>,
}

impl Manifest {
    pub fn parse(json: &str) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn canned_fetch(&self) -> Option<Rc<dyn Fetch>> {
        if self.responses.is_empty() {
            return None;
        }
        let fetch = StaticFetch::new();
        for (url, body) in &self.responses {
            fetch.respond(url, body.as_str());
        }
        Some(Rc::new(fetch))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleEntry {
    pub id: String,
    pub module_path: String,
    pub function_name: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub input_method: Option<String>,
    #[serde(default)]
    pub presenter: Option<String>,
}

impl ArticleEntry {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor::new(&self.id, &self.module_path, &self.function_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleOutput {
    pub id: String,
    pub output: String,
    pub warning: bool,
}

fn append(dom: &dyn Dom, parent: NodeId, tag: &str) -> Result<NodeId, DomError> {
    let node = dom.create_element(tag);
    dom.append_child(parent, node)?;
    Ok(node)
}

fn append_select(
    dom: &dyn Dom,
    parent: NodeId,
    class: &str,
    values: &[&str],
) -> Result<NodeId, DomError> {
    let select = append(dom, parent, "select")?;
    dom.set_class_name(select, class)?;
    for value in values {
        let option = append(dom, select, "option")?;
        dom.set_attribute(option, "value", value)?;
        dom.set_text_content(option, value)?;
    }
    Ok(select)
}

/// Appends the markup a toy article is published with: input-method
/// dropdown, disabled text field and submit button, auto-submit checkbox,
/// presenter dropdown and an output region still showing the no-script
/// warning.
pub fn build_article(dom: &dyn Dom, parent: NodeId, id: &str) -> Result<NodeId, DomError> {
    let article = append(dom, parent, "article")?;
    dom.set_attribute(article, "id", id)?;
    dom.set_class_name(article, "entry")?;

    let form = append(dom, article, "form")?;
    append_select(dom, form, "input", &INPUT_METHODS)?;
    let input = append(dom, form, "input")?;
    dom.set_attribute(input, "type", "text")?;
    dom.disable(input)?;

    let submit = append(dom, article, "button")?;
    dom.set_attribute(submit, "type", "submit")?;
    dom.set_text_content(submit, "Submit")?;
    dom.disable(submit)?;

    let auto = append(dom, article, "div")?;
    let checkbox = append(dom, auto, "input")?;
    dom.set_attribute(checkbox, "type", "checkbox")?;
    dom.set_class_name(checkbox, "auto-submit-checkbox")?;
    dom.disable(checkbox)?;

    append_select(dom, article, "output", &OUTPUT_PRESENTERS)?;
    let output = append(dom, article, "div")?;
    dom.set_class_name(output, "output warning")?;
    let notice = append(dom, output, "p")?;
    dom.set_text_content(notice, "This toy requires Javascript to run.")?;
    Ok(article)
}

/// Toys bundled with the binary.
pub fn demo_modules() -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    registry.register(
        "toys/echo.js",
        ToyModule::new().export("echo", |input, _env| Ok(input.to_string())),
    );
    registry.register(
        "toys/word-count.js",
        ToyModule::new().export("countWords", |input, _env| {
            let words = input.split_whitespace().count();
            if words == 0 {
                return Err(ToyError::msg("nothing to count"));
            }
            Ok(words.to_string())
        }),
    );
    registry.register(
        "toys/get.js",
        ToyModule::new().export("get", |input, env| {
            env.log(&format!("requesting {}", input.trim()));
            Ok(json!({ "request": { "url": input.trim() } }).to_string())
        }),
    );
    registry.register(
        "toys/remember.js",
        ToyModule::new().export("remember", |input, env| {
            env.set_local_temporary_data(json!({ "temporary": { "last": input } }))?;
            Ok(env.get_data()["temporary"].to_string())
        }),
    );
    registry
}

pub struct HeadlessSession {
    document: Rc<MemoryDocument>,
    runtime: ToyRuntime,
    articles: Vec<(ArticleEntry, NodeId)>,
}

impl HeadlessSession {
    pub fn new(
        manifest: &Manifest,
        loader: Rc<dyn ModuleLoader>,
        config: RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let (document, builder) = ToyRuntime::in_memory();
        let mut builder = builder.with_loader(loader).with_config(config);
        if let Some(fetch) = manifest.canned_fetch() {
            builder = builder.with_fetch(fetch);
        }
        let runtime = builder.build()?;

        let dom: &dyn Dom = &*document;
        let body = append(dom, dom.root(), "body")?;
        let mut articles = Vec::with_capacity(manifest.articles.len());
        for entry in &manifest.articles {
            let article = build_article(dom, body, &entry.id)?;
            if let Some(method) = &entry.input_method {
                if let Some(select) = dom.query_selector(article, "select.input")? {
                    dom.set_value(select, method)?;
                }
            }
            if let Some(presenter) = &entry.presenter {
                if let Some(select) = dom.query_selector(article, "select.output")? {
                    dom.set_value(select, presenter)?;
                }
            }
            articles.push((entry.clone(), article));
        }

        Ok(Self {
            document,
            runtime,
            articles,
        })
    }

    pub fn document(&self) -> &Rc<MemoryDocument> {
        &self.document
    }

    pub fn runtime(&self) -> &ToyRuntime {
        &self.runtime
    }

    /// Must run inside a `LocalSet`.
    pub async fn run(&self) -> Result<Vec<ArticleOutput>, RuntimeError> {
        let descriptors: Vec<ComponentDescriptor> =
            self.articles.iter().map(|(entry, _)| entry.descriptor()).collect();
        self.runtime.initialize_visible_components(&descriptors);

        for (_, article) in &self.articles {
            self.document.set_visible(*article);
        }
        self.runtime.settle().await;

        for (entry, _) in &self.articles {
            let Some(component) = self.runtime.component(&entry.id) else {
                warn!(target: "component", article = %entry.id, "toy did not start, skipping submit");
                continue;
            };
            if let Some(input) = &entry.input {
                self.document.set_value(component.input(), input)?;
            }
            self.document.click(component.submit_button());
        }
        self.runtime.settle().await;

        let mut outputs = Vec::with_capacity(self.articles.len());
        for (entry, article) in &self.articles {
            let Some(output) = self.document.query_selector(*article, "div.output")? else {
                continue;
            };
            outputs.push(ArticleOutput {
                id: entry.id.clone(),
                output: self.document.text_content(output),
                warning: self.document.has_class(output, "warning"),
            });
        }
        info!(target: "component", articles = outputs.len(), "headless run finished");
        Ok(outputs)
    }
}
