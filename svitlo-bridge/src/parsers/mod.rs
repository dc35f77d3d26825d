/**
 * PARSERS - Extraction de faits structurés depuis le texte des notifications
 *
 * RÔLE :
 * Deux parsers indépendants, fonctions totales texte → fait ou "pas de match".
 * Aucun parser ne lève d'erreur : un message mal formé est un cas normal.
 *
 * REGISTRE :
 * Les noms symboliques de la config (`parse_kyiv_digital`, `parse_groups_summary`)
 * ne sont résolus qu'au démarrage vers `ParserKind`. Ensuite tout passe par `match`.
 */

pub mod address;
pub mod summary;

pub use address::AddressOutageParser;
pub use summary::GroupsSummaryParser;

use crate::models::Fact;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    AddressOutage,
    GroupsSummary,
}

impl ParserKind {
    pub const ALL: [ParserKind; 2] = [ParserKind::AddressOutage, ParserKind::GroupsSummary];

    /// Nom utilisé dans les specs de source
    pub fn name(self) -> &'static str {
        match self {
            ParserKind::AddressOutage => "parse_kyiv_digital",
            ParserKind::GroupsSummary => "parse_groups_summary",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownParser(pub String);

impl FromStr for ParserKind {
    type Err = UnknownParser;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ParserKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownParser(name.to_string()))
    }
}

/// Parser configuré, prêt à l'emploi
#[derive(Debug, Clone)]
pub enum Parser {
    AddressOutage(AddressOutageParser),
    GroupsSummary(GroupsSummaryParser),
}

impl Parser {
    /// Instancie le parser d'un type donné avec les champs à retirer (parser adresse)
    pub fn build(kind: ParserKind, strip_fields: &[String]) -> Self {
        match kind {
            ParserKind::AddressOutage => Parser::AddressOutage(AddressOutageParser::with_strip_fields(strip_fields)),
            ParserKind::GroupsSummary => Parser::GroupsSummary(GroupsSummaryParser),
        }
    }

    pub fn kind(&self) -> ParserKind {
        match self {
            Parser::AddressOutage(_) => ParserKind::AddressOutage,
            Parser::GroupsSummary(_) => ParserKind::GroupsSummary,
        }
    }

    pub fn parse(&self, text: &str) -> Option<Fact> {
        match self {
            Parser::AddressOutage(p) => p.parse(text).map(Fact::Address),
            Parser::GroupsSummary(p) => p.parse(text).map(Fact::Summary),
        }
    }
}
