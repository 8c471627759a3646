//! Scripted in-memory driver for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::*;
use crate::errors::DriverError;

#[derive(Default)]
struct FakeState {
    elements: Vec<ElementSnapshot>,
    css: HashMap<String, ElementHandle>,
    xpath: HashMap<String, ElementHandle>,
    screenshots: HashMap<ElementHandle, Vec<u8>>,
    page_screenshot: Option<Vec<u8>>,
    page_state: PageState,
    network: NetworkSample,
    mutation_rates: VecDeque<f64>,
    navigations: Vec<String>,
    failing_queries: bool,
    failing_xpaths: HashSet<String>,
}

/// Driver backed by a fixed element table
#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
    reloads: AtomicUsize,
    queries: AtomicUsize,
    page_state_reads: AtomicUsize,
    network_samples: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, snapshot: ElementSnapshot) -> Self {
        self.state.lock().elements.push(snapshot);
        self
    }

    pub fn map_css(self, selector: &str, handle: &str) -> Self {
        self.state
            .lock()
            .css
            .insert(selector.to_string(), ElementHandle::new(handle));
        self
    }

    pub fn map_xpath(self, xpath: &str, handle: &str) -> Self {
        self.state
            .lock()
            .xpath
            .insert(xpath.to_string(), ElementHandle::new(handle));
        self
    }

    pub fn with_screenshot(self, handle: &str, png: Vec<u8>) -> Self {
        self.state
            .lock()
            .screenshots
            .insert(ElementHandle::new(handle), png);
        self
    }

    pub fn with_page_state(self, page_state: PageState) -> Self {
        self.state.lock().page_state = page_state;
        self
    }

    pub fn with_network(self, network: NetworkSample) -> Self {
        self.state.lock().network = network;
        self
    }

    /// Mutation rates returned by successive `page_state` reads; the last value sticks
    pub fn with_mutation_rates(self, rates: impl IntoIterator<Item = f64>) -> Self {
        self.state.lock().mutation_rates.extend(rates);
        self
    }

    /// Make every query fail with a protocol error
    pub fn failing_queries(self) -> Self {
        self.state.lock().failing_queries = true;
        self
    }

    /// Make queries for one XPath fail with a protocol error
    pub fn failing_xpath(self, xpath: &str) -> Self {
        self.state.lock().failing_xpaths.insert(xpath.to_string());
        self
    }

    pub fn set_visible(&self, handle: &str, visible: bool) {
        let mut state = self.state.lock();
        if let Some(el) = state.elements.iter_mut().find(|e| e.handle.0 == handle) {
            el.visible = visible;
        }
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn page_state_reads(&self) -> usize {
        self.page_state_reads.load(Ordering::SeqCst)
    }

    pub fn network_samples(&self) -> usize {
        self.network_samples.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    fn check_queries(&self) -> Result<(), DriverError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().failing_queries {
            return Err(DriverError::Protocol("scripted query failure".into()));
        }
        Ok(())
    }

    fn find(&self, handle: &ElementHandle) -> Result<ElementSnapshot, DriverError> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| &e.handle == handle)
            .cloned()
            .ok_or_else(|| DriverError::StaleHandle(handle.0.clone()))
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn query_selector(&self, css: &str) -> Result<Option<ElementHandle>, DriverError> {
        self.check_queries()?;
        Ok(self.state.lock().css.get(css).cloned())
    }

    async fn query_xpath(&self, xpath: &str) -> Result<Option<ElementHandle>, DriverError> {
        self.check_queries()?;
        let state = self.state.lock();
        if state.failing_xpaths.contains(xpath) {
            return Err(DriverError::Protocol(format!("scripted failure for {xpath}")));
        }
        Ok(state.xpath.get(xpath).cloned())
    }

    async fn query_all_visible(&self) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.check_queries()?;
        Ok(self
            .state
            .lock()
            .elements
            .iter()
            .filter(|e| e.visible)
            .cloned()
            .collect())
    }

    async fn describe(&self, handle: &ElementHandle) -> Result<ElementSnapshot, DriverError> {
        self.find(handle)
    }

    async fn bounding_box(
        &self,
        handle: &ElementHandle,
    ) -> Result<Option<BoundingBox>, DriverError> {
        Ok(self.find(handle)?.bounding_box)
    }

    async fn screenshot_element(&self, handle: &ElementHandle) -> Result<Vec<u8>, DriverError> {
        self.state
            .lock()
            .screenshots
            .get(handle)
            .cloned()
            .ok_or_else(|| DriverError::Unsupported(format!("no screenshot for {handle}")))
    }

    async fn screenshot_page(&self) -> Result<Vec<u8>, DriverError> {
        self.state
            .lock()
            .page_screenshot
            .clone()
            .ok_or_else(|| DriverError::Unsupported("no page screenshot".into()))
    }

    async fn page_state(&self) -> Result<PageState, DriverError> {
        self.page_state_reads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let mut page = state.page_state.clone();
        if state.mutation_rates.len() > 1 {
            page.mutation_rate = state.mutation_rates.pop_front().unwrap_or_default();
        } else if let Some(rate) = state.mutation_rates.front() {
            page.mutation_rate = *rate;
        }
        Ok(page)
    }

    async fn network_sample(&self) -> Result<NetworkSample, DriverError> {
        self.network_samples.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().network.clone())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().page_state.url.clone())
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        state.page_state.url = url.to_string();
        Ok(())
    }

    async fn reload(&self) -> Result<(), DriverError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Visible, enabled element snapshot for building fixtures
pub fn element(handle: &str, tag: &str) -> ElementSnapshot {
    ElementSnapshot {
        handle: ElementHandle::new(handle),
        tag: tag.to_string(),
        visible: true,
        enabled: true,
        ..Default::default()
    }
}
