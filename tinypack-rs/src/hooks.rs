//! Lifecycle hooks.
//!
//! Every [`HookPoint`] has a declared [`HookKind`] that decides how its taps
//! run, and an ordered list of taps. Sync taps may be registered on any
//! point; async taps only on async points.

use std::collections::HashMap;
use std::fmt;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;

use crate::chunk::Chunk;
use crate::compilation::Compilation;
use crate::config::BundlerOptions;
use crate::error::{BundleError, BundleResult};
use crate::module::Module;
use crate::stats::Stats;

/// How the taps of a hook point are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Every tap runs, in order.
    Sync,
    /// Taps run in order until one returns [`HookFlow::Bail`].
    SyncBail,
    /// Taps are awaited one after the other.
    AsyncSeries,
    /// Taps run concurrently and are joined.
    AsyncParallel,
}

impl HookKind {
    pub fn is_async(self) -> bool {
        matches!(self, HookKind::AsyncSeries | HookKind::AsyncParallel)
    }
}

/// Named extension points of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    SucceedModule,
    Seal,
    BeforeChunks,
    AfterChunks,
    BeforeRun,
    Run,
    BeforeCompile,
    Compile,
    Make,
    AfterCompile,
    ShouldEmit,
    Emit,
    Done,
}

impl HookPoint {
    pub fn kind(self) -> HookKind {
        match self {
            HookPoint::SucceedModule
            | HookPoint::Seal
            | HookPoint::BeforeChunks
            | HookPoint::AfterChunks
            | HookPoint::Compile => HookKind::Sync,
            HookPoint::ShouldEmit => HookKind::SyncBail,
            HookPoint::Make => HookKind::AsyncParallel,
            HookPoint::BeforeRun
            | HookPoint::Run
            | HookPoint::BeforeCompile
            | HookPoint::AfterCompile
            | HookPoint::Emit
            | HookPoint::Done => HookKind::AsyncSeries,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookPoint::SucceedModule => "succeedModule",
            HookPoint::Seal => "seal",
            HookPoint::BeforeChunks => "beforeChunks",
            HookPoint::AfterChunks => "afterChunks",
            HookPoint::BeforeRun => "beforeRun",
            HookPoint::Run => "run",
            HookPoint::BeforeCompile => "beforeCompile",
            HookPoint::Compile => "compile",
            HookPoint::Make => "make",
            HookPoint::AfterCompile => "afterCompile",
            HookPoint::ShouldEmit => "shouldEmit",
            HookPoint::Emit => "emit",
            HookPoint::Done => "done",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload handed to the taps of a hook point.
pub enum HookEvent<'a> {
    SucceedModule(&'a Module),
    Seal,
    BeforeChunks,
    AfterChunks(&'a [Chunk]),
    BeforeRun(&'a BundlerOptions),
    Run(&'a BundlerOptions),
    BeforeCompile,
    Compile,
    Make(&'a Compilation<'a>),
    AfterCompile(&'a Compilation<'a>),
    ShouldEmit(&'a Compilation<'a>),
    Emit(&'a Compilation<'a>),
    Done(&'a Stats),
}

impl HookEvent<'_> {
    pub fn point(&self) -> HookPoint {
        match self {
            HookEvent::SucceedModule(_) => HookPoint::SucceedModule,
            HookEvent::Seal => HookPoint::Seal,
            HookEvent::BeforeChunks => HookPoint::BeforeChunks,
            HookEvent::AfterChunks(_) => HookPoint::AfterChunks,
            HookEvent::BeforeRun(_) => HookPoint::BeforeRun,
            HookEvent::Run(_) => HookPoint::Run,
            HookEvent::BeforeCompile => HookPoint::BeforeCompile,
            HookEvent::Compile => HookPoint::Compile,
            HookEvent::Make(_) => HookPoint::Make,
            HookEvent::AfterCompile(_) => HookPoint::AfterCompile,
            HookEvent::ShouldEmit(_) => HookPoint::ShouldEmit,
            HookEvent::Emit(_) => HookPoint::Emit,
            HookEvent::Done(_) => HookPoint::Done,
        }
    }
}

/// Returned by sync taps; only meaningful on [`HookKind::SyncBail`] points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    Bail,
}

type SyncHandler = Box<dyn Fn(&HookEvent<'_>) -> BundleResult<HookFlow>>;
type AsyncHandler = Box<dyn Fn(&HookEvent<'_>) -> LocalBoxFuture<'static, BundleResult<()>>>;

enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

struct Tap {
    name: String,
    handler: Handler,
}

impl Tap {
    fn invoke(&self, event: &HookEvent<'_>) -> LocalBoxFuture<'static, BundleResult<()>> {
        match &self.handler {
            Handler::Sync(handler) => future::ready(handler(event).map(|_| ())).boxed_local(),
            Handler::Async(handler) => handler(event),
        }
    }
}

/// Ordered taps per hook point.
#[derive(Default)]
pub struct Hooks {
    taps: HashMap<HookPoint, Vec<Tap>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (point, taps) in &self.taps {
            let names: Vec<_> = taps.iter().map(|tap| tap.name.as_str()).collect();
            map.entry(point, &names);
        }
        map.finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous tap.
    pub fn tap<F>(&mut self, point: HookPoint, name: impl Into<String>, handler: F)
    where
        F: Fn(&HookEvent<'_>) -> BundleResult<HookFlow> + 'static,
    {
        self.push(point, name.into(), Handler::Sync(Box::new(handler)));
    }

    /// Registers an asynchronous tap. Fails on points of a sync kind.
    pub fn tap_async<F>(&mut self, point: HookPoint, name: impl Into<String>, handler: F) -> BundleResult<()>
    where
        F: Fn(&HookEvent<'_>) -> LocalBoxFuture<'static, BundleResult<()>> + 'static,
    {
        let name = name.into();
        if !point.kind().is_async() {
            return Err(BundleError::Hook {
                hook: point.name(),
                tap: name,
                message: format!("cannot register an async tap on a {:?} hook", point.kind()),
            });
        }
        self.push(point, name, Handler::Async(Box::new(handler)));
        Ok(())
    }

    pub fn is_empty(&self, point: HookPoint) -> bool {
        self.taps(point).is_empty()
    }

    fn push(&mut self, point: HookPoint, name: String, handler: Handler) {
        log::debug!(target: "tinypack", "tap {} on {}", name, point);
        self.taps.entry(point).or_default().push(Tap { name, handler });
    }

    fn taps(&self, point: HookPoint) -> &[Tap] {
        self.taps.get(&point).map(Vec::as_slice).unwrap_or_default()
    }

    /// Runs the taps of a sync point. Returns [`HookFlow::Bail`] only for
    /// [`HookKind::SyncBail`] points whose taps short-circuited.
    pub fn call(&self, event: &HookEvent<'_>) -> BundleResult<HookFlow> {
        self.call_point(event.point(), event)
    }

    fn call_point(&self, point: HookPoint, event: &HookEvent<'_>) -> BundleResult<HookFlow> {
        let bails = point.kind() == HookKind::SyncBail;
        for tap in self.taps(point) {
            let Handler::Sync(handler) = &tap.handler else {
                continue;
            };
            if handler(event)? == HookFlow::Bail && bails {
                log::debug!(target: "tinypack", "{} bailed in tap {}", point, tap.name);
                return Ok(HookFlow::Bail);
            }
        }
        Ok(HookFlow::Continue)
    }

    /// Runs the taps of an async point, in series or joined depending on
    /// its kind.
    pub async fn call_async(&self, event: &HookEvent<'_>) -> BundleResult<()> {
        let point = event.point();
        let taps = self.taps(point);
        if point.kind() == HookKind::AsyncParallel {
            future::try_join_all(taps.iter().map(|tap| tap.invoke(event))).await?;
        } else {
            for tap in taps {
                tap.invoke(event).await?;
            }
        }
        Ok(())
    }
}
