use std::any::Any;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::*;
use crate::errors::ResourceError;
use crate::registry::Registration;
use crate::resource::{no_opts, Resource, ScanOpts};

#[derive(Debug)]
struct Plain {
    name: String,
}

#[async_trait]
impl Resource for Plain {
    async fn remove(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    fn display_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct CountLister {
    count: usize,
}

#[async_trait]
impl Lister for CountLister {
    async fn list(&self, _ctx: &CancellationToken, _opts: &Opts) -> Result<Vec<Box<dyn Resource>>> {
        Ok((0..self.count).map(|i| Box::new(Plain { name: format!("r{i}") }) as Box<dyn Resource>).collect())
    }
}

struct SkipLister;

#[async_trait]
impl Lister for SkipLister {
    async fn list(&self, _ctx: &CancellationToken, _opts: &Opts) -> Result<Vec<Box<dyn Resource>>> {
        Err(ResourceError::SkipRequest("not available here".into()).into())
    }
}

struct PanicLister;

#[async_trait]
impl Lister for PanicLister {
    async fn list(&self, _ctx: &CancellationToken, _opts: &Opts) -> Result<Vec<Box<dyn Resource>>> {
        panic!("lister exploded");
    }
}

#[derive(Debug)]
struct Renaming {
    name: String,
}

#[async_trait]
impl Resource for Renaming {
    async fn remove(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    fn display_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn before_enqueue(&mut self) {
        self.name = format!("prepared-{}", self.name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RenamingLister;

#[async_trait]
impl Lister for RenamingLister {
    async fn list(&self, _ctx: &CancellationToken, _opts: &Opts) -> Result<Vec<Box<dyn Resource>>> {
        Ok(vec![Box::new(Renaming { name: "raw".into() }) as Box<dyn Resource>])
    }
}

struct OptsEchoLister;

#[async_trait]
impl Lister for OptsEchoLister {
    async fn list(&self, _ctx: &CancellationToken, opts: &Opts) -> Result<Vec<Box<dyn Resource>>> {
        let region = opts.as_any().downcast_ref::<String>().cloned().unwrap_or_default();
        Ok(vec![Box::new(Plain { name: region }) as Box<dyn Resource>])
    }
}

fn registry_with(kind: &str, lister: Arc<dyn Lister>) -> Registry {
    let mut registry = Registry::new();
    registry.register(Registration::new(kind, lister)).unwrap();
    registry
}

async fn drain(mut rx: mpsc::Receiver<Item>) -> Vec<Item> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

#[tokio::test]
async fn publishes_discovered_items() {
    let registry = registry_with("Thing", Arc::new(CountLister { count: 3 }));
    let scanner = Scanner::new("000000", vec!["Thing".to_string()], no_opts());

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.kind == "Thing" && i.owner == "000000"));
    assert!(items.iter().all(|i| i.state == crate::queue::ItemState::New));
}

#[tokio::test]
async fn missing_lister_is_skipped() {
    let registry = registry_with("Known", Arc::new(CountLister { count: 1 }));
    let scanner = Scanner::new("000000", vec!["Unknown".to_string(), "Known".to_string()], no_opts());

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, "Known");
}

#[tokio::test]
async fn skip_request_errors_are_silent() {
    let registry = registry_with("Skippy", Arc::new(SkipLister));
    let scanner = Scanner::new("000000", vec!["Skippy".to_string()], no_opts());

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn panicking_lister_does_not_poison_the_scan() {
    let mut registry = registry_with("Boom", Arc::new(PanicLister));
    registry.register(Registration::new("Fine", Arc::new(CountLister { count: 2 }))).unwrap();
    let scanner = Scanner::new("000000", vec!["Boom".to_string(), "Fine".to_string()], no_opts());

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.kind == "Fine"));
}

#[tokio::test]
async fn full_channel_drops_the_rest_of_that_lister() {
    let registry = registry_with("Chatty", Arc::new(CountLister { count: 10 }));
    let mut scanner = Scanner::new("000000", vec!["Chatty".to_string()], no_opts());
    scanner.set_queue_size(4);

    // Not draining until the scanner finishes: the channel can only absorb
    // its capacity.
    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    scanner.run(&ctx, &registry, tx).await.unwrap();

    let items = drain(rx).await;
    assert_eq!(items.len(), 4);
}

#[tokio::test]
async fn before_enqueue_runs_ahead_of_publication() {
    let registry = registry_with("Renaming", Arc::new(RenamingLister));
    let scanner = Scanner::new("000000", vec!["Renaming".to_string()], no_opts());

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name(), "prepared-raw");
}

#[tokio::test]
async fn mutate_opts_rewrites_per_kind() {
    let registry = registry_with("Regional", Arc::new(OptsEchoLister));
    let mut scanner = Scanner::new("000000", vec!["Regional".to_string()], no_opts());
    scanner
        .register_mutate_opts_fn(Arc::new(|_opts, kind| Arc::new(format!("eu-mars-1/{kind}")) as Opts))
        .unwrap();

    let (tx, rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    let (run, items) = tokio::join!(scanner.run(&ctx, &registry, tx), drain(rx));

    run.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name(), "eu-mars-1/Regional");
}

#[test]
fn second_mutate_opts_fn_is_rejected() {
    let mut scanner = Scanner::new("000000", vec![], no_opts());
    scanner.register_mutate_opts_fn(Arc::new(|opts, _| opts.clone())).unwrap();
    assert!(scanner.register_mutate_opts_fn(Arc::new(|opts, _| opts.clone())).is_err());
}

#[tokio::test]
async fn cancelled_context_aborts_the_fan_out() {
    let registry = registry_with("Thing", Arc::new(CountLister { count: 1 }));
    let scanner = Scanner::new("000000", vec!["Thing".to_string()], no_opts());

    let (tx, _rx) = mpsc::channel(scanner.queue_size());
    let ctx = CancellationToken::new();
    ctx.cancel();
    let err = scanner.run(&ctx, &registry, tx).await.unwrap_err();
    assert_eq!(err.to_string(), "scan cancelled");
}

#[test]
fn fingerprint_distinguishes_owner_kinds_and_opts() {
    let a = Scanner::new("000000", vec!["Thing".to_string()], no_opts());
    let b = Scanner::new("111111", vec!["Thing".to_string()], no_opts());
    let c = Scanner::new("000000", vec!["Other".to_string()], no_opts());
    let d = Scanner::new("000000", vec!["Thing".to_string()], Arc::new("region".to_string()) as Opts);

    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_ne!(a.fingerprint(), d.fingerprint());
    assert_eq!(a.fingerprint(), Scanner::new("000000", vec!["Thing".to_string()], no_opts()).fingerprint());
}
