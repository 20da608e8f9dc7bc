use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use keyboard_types::Key;
use serde_json::json;
use tokio::task::LocalSet;
use toybox::dom::{Dom, DomError, MemoryDocument, NodeId};
use toybox::headless::build_article;
use toybox::net::StaticFetch;
use toybox::presenters::PresenterRegistry;
use toybox::{ComponentDescriptor, ModuleRegistry, ToyError, ToyModule, ToyRuntime};

const URL: &str = "https://example.com/data.txt";

struct Page {
    document: Rc<MemoryDocument>,
    runtime: ToyRuntime,
    article: NodeId,
    fetch: Rc<StaticFetch>,
}

impl Page {
    fn new(module: ToyModule) -> Self {
        Self::with_presenters(module, PresenterRegistry::default())
    }

    fn with_presenters(module: ToyModule, presenters: PresenterRegistry) -> Self {
        let registry = ModuleRegistry::new();
        registry.register("toys/test.js", module);
        let fetch = Rc::new(StaticFetch::new());
        let (document, builder) = ToyRuntime::in_memory();
        let runtime = builder
            .with_loader(Rc::new(registry))
            .with_fetch(fetch.clone())
            .with_presenters(presenters)
            .build()
            .unwrap();
        let article = build_article(&*document, document.root(), "TOY1").unwrap();
        Self {
            document,
            runtime,
            article,
            fetch,
        }
    }

    async fn start(&self) {
        let armed = self
            .runtime
            .initialize_visible_components(&[ComponentDescriptor::new("TOY1", "toys/test.js", "run")]);
        assert_eq!(armed, 1);
        self.document.set_visible(self.article);
        self.runtime.settle().await;
    }

    fn select(&self, selector: &str) -> NodeId {
        self.document
            .query_selector(self.article, selector)
            .unwrap()
            .unwrap_or_else(|| panic!("no element matches {selector}"))
    }

    fn output(&self) -> NodeId {
        self.select("div.output")
    }

    fn output_text(&self) -> String {
        self.document.text_content(self.output())
    }

    async fn submit(&self, input: &str) {
        self.document
            .set_value(self.select(r#"input[type="text"]"#), input)
            .unwrap();
        let outcome = self.document.click(self.select(r#"button[type="submit"]"#));
        assert!(outcome.default_prevented);
        self.runtime.settle().await;
    }
}

fn echo() -> ToyModule {
    ToyModule::new().export("run", |input, _env| Ok(input.to_string()))
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn initialization_enables_controls_and_clears_warning() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.start().await;

            let input = page.select(r#"input[type="text"]"#);
            let submit = page.select(r#"button[type="submit"]"#);
            assert!(!page.document.is_disabled(input));
            assert!(!page.document.is_disabled(submit));
            assert!(!page.document.is_disabled(page.select(".auto-submit-checkbox")));
            assert_eq!(page.output_text(), "Ready for input");
            assert!(!page.document.has_class(page.output(), "warning"));
        })
        .await;
}

#[tokio::test]
async fn result_is_rendered_and_recorded() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.start().await;
            page.submit("hello").await;

            assert_eq!(page.output_text(), "hello");
            let component = page.runtime.component("TOY1").unwrap();
            assert_eq!(component.submissions(), 1);
            assert_eq!(component.last_result().as_deref(), Some("hello"));
            assert_eq!(page.runtime.state().output("TOY1"), Some(json!("hello")));
        })
        .await;
}

#[tokio::test]
async fn request_result_is_fetched_exactly_once() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(ToyModule::new().export("run", |input, _env| {
                Ok(json!({ "request": { "url": input } }).to_string())
            }));
            page.fetch.respond(URL, "fetched body");
            page.start().await;
            page.submit(URL).await;

            assert_eq!(page.fetch.calls(), vec![URL.to_string()]);
            assert_eq!(page.output_text(), "fetched body");
            assert!(!page.document.has_class(page.output(), "warning"));
            assert_eq!(
                page.runtime.state().output("TOY1"),
                Some(json!({ "request": { "url": URL } }))
            );
        })
        .await;
}

#[tokio::test]
async fn failed_fetch_renders_error_with_warning() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(ToyModule::new().export("run", |input, _env| {
                Ok(json!({ "request": { "url": input } }).to_string())
            }));
            page.fetch.fail(URL, "connection refused");
            page.start().await;
            page.submit(URL).await;

            let text = page.output_text();
            assert!(text.starts_with("Error fetching URL: "), "{text}");
            assert!(text.contains("connection refused"), "{text}");
            assert!(page.document.has_class(page.output(), "warning"));
        })
        .await;
}

#[tokio::test]
async fn processing_error_is_rendered_without_fetching() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(
                ToyModule::new().export("run", |_input, _env| Err(ToyError::msg("boom"))),
            );
            page.start().await;
            page.submit(URL).await;

            assert_eq!(page.output_text(), "Error: boom");
            assert!(page.document.has_class(page.output(), "warning"));
            assert!(page.fetch.calls().is_empty());
        })
        .await;
}

#[tokio::test]
async fn request_without_string_url_is_rendered_as_text() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(ToyModule::new().export("run", |_input, _env| {
                Ok(json!({ "request": { "url": 7 } }).to_string())
            }));
            page.start().await;
            page.submit("").await;

            assert!(page.fetch.calls().is_empty());
            assert_eq!(page.output_text(), r#"{"request":{"url":7}}"#);
        })
        .await;
}

#[tokio::test]
async fn enter_submits_and_other_keys_do_not() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.start().await;
            let input = page.select(r#"input[type="text"]"#);
            page.document.set_value(input, "typed").unwrap();

            let other = page.document.press_key(input, Key::Character("a".into()));
            assert!(!other.default_prevented);
            assert_eq!(page.runtime.component("TOY1").unwrap().submissions(), 0);

            let enter = page.document.press_key(input, Key::Enter);
            assert!(enter.default_prevented);
            assert_eq!(page.output_text(), "typed");
        })
        .await;
}

#[tokio::test]
async fn unknown_presenter_falls_back_to_text() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.document
                .set_value(page.select("select.output"), "tic-tac-toe")
                .unwrap();
            page.start().await;
            page.submit("plain").await;

            let paragraph = page.document.query_selector(page.output(), "p").unwrap();
            assert!(paragraph.is_some());
            assert_eq!(page.output_text(), "plain");
        })
        .await;
}

#[tokio::test]
async fn changing_presenter_rerenders_last_result() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.start().await;
            page.submit("[a, b]").await;
            assert!(page.document.query_selector(page.output(), "pre").unwrap().is_none());

            page.document
                .select_value(page.select("select.output"), "pre")
                .unwrap();
            assert!(page.document.query_selector(page.output(), "pre").unwrap().is_some());
            assert_eq!(page.output_text(), "a\nb");
        })
        .await;
}

#[tokio::test]
async fn failing_presenter_renders_error_with_warning() {
    LocalSet::new()
        .run_until(async {
            let mut presenters = PresenterRegistry::default();
            presenters.register("broken", |_content, dom| Err(DomError::Detached(dom.root())));
            let page = Page::with_presenters(echo(), presenters);
            page.start().await;
            page.document
                .set_value(page.select("select.output"), "broken")
                .unwrap();

            page.submit("hello").await;
            assert!(
                page.output_text().starts_with("Error: "),
                "output was {:?}",
                page.output_text()
            );
            assert!(page.document.has_class(page.output(), "warning"));

            page.document
                .select_value(page.select("select.output"), "text")
                .unwrap();
            assert_eq!(page.output_text(), "hello");
        })
        .await;
}

#[tokio::test]
async fn article_without_submit_button_gets_no_listeners() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    LocalSet::new()
        .run_until(async {
            let registry = ModuleRegistry::new();
            registry.register("toys/test.js", echo());
            let (document, builder) = ToyRuntime::in_memory();
            let runtime = builder
                .with_loader(Rc::new(registry))
                .with_fetch(Rc::new(StaticFetch::new()))
                .build()
                .unwrap();

            let article = document.create_element("article");
            document.set_attribute(article, "id", "TOY1").unwrap();
            document.append_child(document.root(), article).unwrap();
            for tag in ["input", "div"] {
                let node = document.create_element(tag);
                document.append_child(article, node).unwrap();
            }
            let output = document.query_selector(article, "div").unwrap().unwrap();
            document.set_class_name(output, "output").unwrap();

            runtime.initialize_visible_components(&[ComponentDescriptor::new(
                "TOY1",
                "toys/test.js",
                "run",
            )]);
            document.set_visible(article);
            runtime.settle().await;

            assert!(runtime.component("TOY1").is_none());
            assert_eq!(document.listener_count(), 0);
        })
        .await;

    let captured = logs.text();
    assert!(
        captured
            .lines()
            .any(|line| line.contains("WARN") && line.contains("TOY1")),
        "logs were {captured:?}"
    );
}

#[tokio::test]
async fn teardown_releases_every_listener() {
    LocalSet::new()
        .run_until(async {
            let page = Page::new(echo());
            page.start().await;
            assert!(page.document.listener_count() > 0);

            page.runtime.teardown("TOY1").unwrap();
            assert_eq!(page.document.listener_count(), 0);
            assert_eq!(page.document.observer_count(), 0);
            assert!(page.runtime.component("TOY1").is_none());

            page.document.click(page.select(r#"button[type="submit"]"#));
            assert_eq!(page.output_text(), "Ready for input");
        })
        .await;
}
