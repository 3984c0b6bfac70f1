//! Master/replica suites: failover, write-back caching, invalidation.
