use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    ListSecrets { source: crate::store::Error },

    #[snafu(display("{source}"))]
    ListDeclarations { source: crate::source::Error },
}
