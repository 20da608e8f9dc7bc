use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{AutoSubmitPoller, Disposers};
use crate::dom::{Dom, DomError, DomEvent, EventKind, NodeId};
use crate::inputs::{InputMethod, InputSwitcher};
use crate::net::{Fetch, FetchError};
use crate::presenters::{PresenterRegistry, DEFAULT_PRESENTER};
use crate::session::{RuntimeContext, TaskTracker};
use crate::state::StateStore;
use crate::toy::{ProcessingFn, ToyEnv, ToyError};

const WARNING_CLASS: &str = "warning";

/// The controls a toy article must contain.
#[derive(Debug, Clone, Copy)]
struct Controls {
    input: NodeId,
    submit: NodeId,
    output: NodeId,
}

impl Controls {
    fn find(dom: &dyn Dom, article: NodeId) -> Option<Self> {
        Some(Self {
            input: first_match(dom, article, &[r#"input[type="text"]"#, "input"])?,
            submit: first_match(dom, article, &[r#"button[type="submit"]"#, "button"])?,
            output: first_match(dom, article, &["div.output"])?,
        })
    }
}

fn first_match(dom: &dyn Dom, scope: NodeId, selectors: &[&str]) -> Option<NodeId> {
    selectors
        .iter()
        .find_map(|selector| dom.query_selector(scope, selector).ok().flatten())
}

/// `{"request": {"url": "..."}}` asks the runtime to fetch a URL.
fn request_url(value: &Value) -> Option<&str> {
    value.get("request")?.get("url")?.as_str()
}

/// One live toy: its controls, the listeners wired to them, and the
/// widgets it owns.
pub struct Component {
    article_id: String,
    article: NodeId,
    controls: Controls,
    output_select: Option<NodeId>,
    processing: ProcessingFn,
    dom: Rc<dyn Dom>,
    presenters: Rc<PresenterRegistry>,
    state: StateStore,
    fetch: Rc<dyn Fetch>,
    tasks: TaskTracker,
    disposers: Disposers,
    switcher: RefCell<Option<Rc<InputSwitcher>>>,
    poller: RefCell<Option<Rc<AutoSubmitPoller>>>,
    last_result: RefCell<Option<String>>,
    submissions: Cell<usize>,
    torn_down: Cell<bool>,
    this: Weak<Component>,
}

/// Wires a loaded processing function into its article.
///
/// Returns `None`, with nothing attached, when the article lacks a text
/// input, a submit button or an output region.
pub fn initialize_component(
    ctx: &RuntimeContext,
    article: NodeId,
    article_id: &str,
    processing: ProcessingFn,
) -> Option<Rc<Component>> {
    let Some(controls) = Controls::find(ctx.dom.as_ref(), article) else {
        warn!(
            target: "component",
            article = article_id,
            "toy is missing its input, submit button or output region"
        );
        return None;
    };

    let output_select = first_match(ctx.dom.as_ref(), article, &["select.output"]);
    let component = Rc::new_cyclic(|this| Component {
        article_id: article_id.to_string(),
        article,
        controls,
        output_select,
        processing,
        dom: Rc::clone(&ctx.dom),
        presenters: Rc::clone(&ctx.presenters),
        state: ctx.state.clone(),
        fetch: Rc::clone(&ctx.fetch),
        tasks: ctx.tasks.clone(),
        disposers: Disposers::new(),
        switcher: RefCell::new(None),
        poller: RefCell::new(None),
        last_result: RefCell::new(None),
        submissions: Cell::new(0),
        torn_down: Cell::new(false),
        this: this.clone(),
    });

    if let Err(err) = component.wire(ctx) {
        error!(target: "component", article = article_id, error = %err, "failed to initialize toy");
        if let Err(err) = component.teardown() {
            error!(target: "component", article = article_id, error = %err, "cleanup after failed initialization failed");
        }
        return None;
    }

    info!(
        target: "component",
        article = article_id,
        listeners = component.listener_count(),
        "toy ready"
    );
    Some(component)
}

impl Component {
    pub fn article_id(&self) -> &str {
        &self.article_id
    }

    pub fn article(&self) -> NodeId {
        self.article
    }

    pub fn input(&self) -> NodeId {
        self.controls.input
    }

    pub fn submit_button(&self) -> NodeId {
        self.controls.submit
    }

    pub fn output(&self) -> NodeId {
        self.controls.output
    }

    /// Listeners this component attached directly, not counting the
    /// auxiliary input widget's own.
    pub fn listener_count(&self) -> usize {
        self.disposers.len()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.get()
    }

    pub fn last_result(&self) -> Option<String> {
        self.last_result.borrow().clone()
    }

    pub fn input_method(&self) -> Option<InputMethod> {
        self.switcher.borrow().as_ref().map(|switcher| switcher.method())
    }

    pub fn switcher(&self) -> Option<Rc<InputSwitcher>> {
        self.switcher.borrow().clone()
    }

    pub fn poller(&self) -> Option<Rc<AutoSubmitPoller>> {
        self.poller.borrow().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    fn wire(&self, ctx: &RuntimeContext) -> Result<(), DomError> {
        let dom = &self.dom;
        let Controls { input, submit, output } = self.controls;

        dom.disable(input)?;
        dom.disable(submit)?;
        self.render(DEFAULT_PRESENTER, "Initialising...")?;

        let this = self.this.clone();
        self.disposers.listen(dom, submit, EventKind::Click, move |event| {
            if let Some(component) = this.upgrade() {
                component.submit(Some(event));
            }
        })?;

        let this = self.this.clone();
        self.disposers.listen(dom, input, EventKind::KeyPress, move |event| {
            if !event.is_enter() {
                return;
            }
            if let Some(component) = this.upgrade() {
                component.submit(Some(event));
            }
        })?;

        if let Some(select) = self.output_select {
            let this = self.this.clone();
            self.disposers.listen(dom, select, EventKind::Change, move |_| {
                if let Some(component) = this.upgrade() {
                    component.rerender();
                }
            })?;
        }

        if let Some(select) = dom.query_selector(self.article, "select.input")? {
            let container = dom.parent(input).unwrap_or(self.article);
            let switcher = Rc::new(InputSwitcher::new(
                Rc::clone(dom),
                container,
                input,
                Rc::clone(&ctx.input_methods),
            ));
            *self.switcher.borrow_mut() = Some(Rc::clone(&switcher));

            let this = self.this.clone();
            self.disposers.listen(dom, select, EventKind::Change, move |_| {
                if let Some(component) = this.upgrade() {
                    component.switch_input_method(select);
                }
            })?;
            switcher.select(&dom.value(select));
        }

        if let Some(checkbox) = dom.query_selector(self.article, ".auto-submit-checkbox")? {
            let this = self.this.clone();
            let poller = AutoSubmitPoller::new(Rc::clone(dom), Rc::clone(&ctx.frames), input, move || {
                if let Some(component) = this.upgrade() {
                    component.submit(None);
                }
            });
            *self.poller.borrow_mut() = Some(Rc::clone(&poller));

            dom.enable(checkbox)?;
            let handle = Rc::downgrade(&poller);
            let weak_dom = Rc::downgrade(dom);
            self.disposers.listen(dom, checkbox, EventKind::Change, move |_| {
                let (Some(poller), Some(dom)) = (handle.upgrade(), weak_dom.upgrade()) else {
                    return;
                };
                poller.set_enabled(dom.is_checked(checkbox));
            })?;
        }

        dom.enable(submit)?;
        if self.input_method().map_or(true, |method| method == InputMethod::Text) {
            dom.enable(input)?;
        }
        self.render(DEFAULT_PRESENTER, "Ready for input")?;
        dom.remove_class(output, WARNING_CLASS)
    }

    fn switch_input_method(&self, select: NodeId) {
        let Some(switcher) = self.switcher() else {
            return;
        };
        switcher.select(&self.dom.value(select));
    }

    /// Runs the processing function on the current input and renders the
    /// outcome. A click or Enter keypress has its default action suppressed.
    pub fn submit(&self, event: Option<&DomEvent>) {
        if let Some(event) = event {
            event.prevent_default();
        }
        if self.torn_down.get() {
            return;
        }
        self.submissions.set(self.submissions.get() + 1);

        let input = self.dom.value(self.controls.input);
        debug!(target: "component", article = %self.article_id, "submitting toy input");
        let env = ToyEnv::new(&self.article_id, self.state.clone(), Rc::clone(&self.fetch));
        let outcome = (self.processing)(&input, &env);
        if let Err(err) = self.handle_outcome(outcome) {
            error!(target: "component", article = %self.article_id, error = %err, "failed to render toy output");
            self.show_failure(&err);
        }
    }

    fn handle_outcome(&self, outcome: Result<String, ToyError>) -> Result<(), DomError> {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(target: "component", article = %self.article_id, error = %err, "processing function failed");
                self.render(DEFAULT_PRESENTER, &format!("Error: {err}"))?;
                return self.dom.add_class(self.controls.output, WARNING_CLASS);
            }
        };

        let parsed = serde_json::from_str::<Value>(&result).ok();
        self.state.record_output(
            &self.article_id,
            parsed
                .clone()
                .unwrap_or_else(|| Value::String(result.clone())),
        );

        if let Some(url) = parsed.as_ref().and_then(request_url) {
            self.spawn_fetch(url.to_string());
            return Ok(());
        }

        *self.last_result.borrow_mut() = Some(result.clone());
        self.render(&self.selected_presenter(), &result)?;
        self.dom.remove_class(self.controls.output, WARNING_CLASS)
    }

    fn spawn_fetch(&self, url: String) {
        debug!(target: "fetch", article = %self.article_id, url = %url, "toy requested a URL");
        let this = self.this.clone();
        let fetch = Rc::clone(&self.fetch);
        self.tasks.spawn(async move {
            let body = match fetch.fetch(&url).await {
                Ok(response) => {
                    debug!(target: "fetch", url = %url, status = response.status(), "fetch answered");
                    response.text().await
                }
                Err(err) => Err(err),
            };
            let Some(component) = this.upgrade() else {
                return;
            };
            if component.torn_down.get() {
                return;
            }
            if let Err(err) = component.show_fetched(&url, body) {
                error!(target: "component", article = %component.article_id, error = %err, "failed to render fetched body");
                component.show_failure(&err);
            }
        });
    }

    fn show_fetched(&self, url: &str, body: Result<String, FetchError>) -> Result<(), DomError> {
        match body {
            Ok(text) => {
                *self.last_result.borrow_mut() = Some(text.clone());
                self.render(&self.selected_presenter(), &text)?;
                self.dom.remove_class(self.controls.output, WARNING_CLASS)
            }
            Err(err) => {
                error!(target: "fetch", article = %self.article_id, url, error = %err, "fetch failed");
                self.render(DEFAULT_PRESENTER, &format!("Error fetching URL: {err}"))?;
                self.dom.add_class(self.controls.output, WARNING_CLASS)
            }
        }
    }

    fn selected_presenter(&self) -> String {
        self.output_select
            .map(|select| self.dom.value(select))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PRESENTER.to_string())
    }

    /// Re-renders the last result with the presenter now selected.
    fn rerender(&self) {
        let Some(result) = self.last_result() else {
            return;
        };
        if let Err(err) = self.render(&self.selected_presenter(), &result) {
            error!(target: "component", article = %self.article_id, error = %err, "failed to re-render output");
            self.show_failure(&err);
        }
    }

    /// Falls back to the plain presenter when rendering itself failed.
    fn show_failure(&self, err: &DomError) {
        let shown = self
            .render(DEFAULT_PRESENTER, &format!("Error: {err}"))
            .and_then(|()| self.dom.add_class(self.controls.output, WARNING_CLASS));
        if let Err(err) = shown {
            error!(target: "component", article = %self.article_id, error = %err, "failed to show render error");
        }
    }

    fn render(&self, presenter: &str, content: &str) -> Result<(), DomError> {
        self.presenters
            .present(self.dom.as_ref(), presenter, content, self.controls.output)
            .map(|_| ())
    }

    /// Removes every listener and widget this component installed.
    pub fn teardown(&self) -> Result<(), DomError> {
        self.torn_down.set(true);
        if let Some(poller) = self.poller.borrow_mut().take() {
            poller.stop();
        }
        let disposed = self.disposers.dispose_all();
        let switcher = self.switcher.borrow_mut().take();
        let widget = match switcher {
            Some(switcher) => switcher.teardown(),
            None => Ok(()),
        };
        debug!(target: "component", article = %self.article_id, "toy torn down");
        disposed.and(widget)
    }
}
