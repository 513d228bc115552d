mod backends;
mod streaming_e2e;
