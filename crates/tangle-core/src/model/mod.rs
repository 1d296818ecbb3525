pub mod resource;
pub mod uri;

pub use resource::{
    LinkKind, Point, Resource, ResourceKind, ResourceLink, Section, TagOccurrence, TextRange,
};
pub use uri::{Uri, UriScheme};
