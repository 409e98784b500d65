//! Secret sealing adapters.

mod envelope;

pub use envelope::EnvelopeSecretStore;
