#![allow(dead_code)]

use std::sync::Arc;

use blogpilot::context::{
    CommentGenerator, MapConfigStore, SecurityContext, StaticContextProvider,
};
use blogpilot::engine::{EngineOptions, RunSummary, Scheduler};
use blogpilot::errors::Result;
use blogpilot::task::TaskSpec;
use blogpilot_test_utils::fakes::{
    EventRecorder, Tally, RecordingBrowser, StaticLicense, factory_with_tally,
};
use blogpilot_test_utils::{init_tracing, with_timeout};

/// A scheduler wired to recording fakes.
pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub tally: Arc<Tally>,
    pub browser: Arc<RecordingBrowser>,
    pub events: Arc<EventRecorder>,
}

pub struct HarnessBuilder {
    options: EngineOptions,
    browser: Arc<RecordingBrowser>,
    settings: MapConfigStore,
    comments: Option<Arc<dyn CommentGenerator>>,
    license: Option<Arc<StaticLicense>>,
}

impl HarnessBuilder {
    pub fn browser(mut self, browser: Arc<RecordingBrowser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn setting(mut self, key: &str, value: &str) -> Self {
        self.settings = self.settings.with(key, value);
        self
    }

    pub fn comments(mut self, generator: Arc<dyn CommentGenerator>) -> Self {
        self.comments = Some(generator);
        self
    }

    pub fn license(mut self, license: Arc<StaticLicense>) -> Self {
        self.license = Some(license);
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();
        let tally = Tally::new();
        let security = SecurityContext::from_descriptors(["integration-test"]);
        let mut provider = StaticContextProvider::new(
            self.browser.clone(),
            Arc::new(self.settings),
            security.clone(),
        );
        if let Some(generator) = self.comments {
            provider = provider.with_comment_generator(generator);
        }

        let mut scheduler = Scheduler::new(
            factory_with_tally(Arc::clone(&tally)),
            Arc::new(provider),
            self.options,
        );
        if let Some(license) = self.license {
            scheduler = scheduler.with_license(license, security.fingerprint().clone());
        }
        let events = EventRecorder::attach(scheduler.event_bus());

        Harness {
            scheduler: Arc::new(scheduler),
            tally,
            browser: self.browser,
            events,
        }
    }
}

impl Harness {
    pub fn builder(options: EngineOptions) -> HarnessBuilder {
        HarnessBuilder {
            options,
            browser: RecordingBrowser::new(),
            settings: MapConfigStore::new(),
            comments: None,
            license: None,
        }
    }

    pub fn new(options: EngineOptions) -> Self {
        Self::builder(options).build()
    }

    pub async fn run(&self, specs: Vec<TaskSpec>) -> Result<RunSummary> {
        with_timeout(self.scheduler.start(specs)).await
    }
}
