// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concrete adapters for the domain layer's traits: concurrent stores,
//! a pub/sub event bus, a registry, and the executor family.

pub mod event_bus;
pub mod executors;
pub mod idempotency_store;
pub mod prompt_cache;
pub mod prompt_template_engine;
pub mod registry;
pub mod repository;

pub use event_bus::ToolEventBus;
pub use idempotency_store::IdempotencyStore;
pub use prompt_cache::PromptCache;
pub use registry::Registry;
