//! Vector recipes for tensions and doctrines

use super::VectorStrategy;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::search::{HybridSearchStrategy, WeightedVector};
use crate::vector::{add_scaled, combine_weighted, normalize, CachedEmbedder};
use futures::future::join_all;
use tracing::{debug, warn};

/// Query phrases for well-known Czech civil-law doctrines
pub const DOCTRINE_PHRASES: &[(&str, &str)] = &[
    ("vydržení", "vydržení dobromyslná držba legitimní očekávání časový faktor třicet let deset let faktický výkon práva"),
    ("dobrá_víra", "dobrá víra dobromyslnost nevěděl nemohl vědět důvodně spoléhal legitimní důvěra"),
    ("bezdůvodné_obohacení", "bezdůvodné obohacení bez právního důvodu neoprávněný prospěch vydání plnění"),
    ("ochrana_spotřebitele", "ochrana spotřebitele slabší strana nerovné postavení adhezní smlouva"),
    ("náhrada_škody", "náhrada škody způsobená škoda zavinění příčinná souvislost"),
    ("neplatnost", "neplatnost absolutní neplatnost relativní neplatnost rozpor se zákonem dobrými mravy"),
    ("předběžné_opatření", "předběžné opatření prozatímní úprava hrozící škoda neodkladné"),
    ("služebnost", "služebnost věcné břemeno právo cesty právo průchodu oprávněný povinný"),
    ("vlastnické_právo", "vlastnické právo vlastnictví vlastník držet užívat požívat nakládat vyloučit"),
    ("vlastnictví", "vlastnictví vlastnické právo vlastník absolutní věcné právo"),
    ("spoluvlastnictví", "spoluvlastnictví podílové spoluvlastnictví společné jmění"),
    ("smlouva", "smlouva smluvní strany závazek plnění protiplnění"),
    ("kupní_smlouva", "kupní smlouva kupující prodávající kupní cena převod vlastnictví"),
    ("nájemní_smlouva", "nájem nájemní smlouva pronajímatel nájemce nájemné"),
    ("smlouva_o_dílo", "smlouva o dílo zhotovitel objednatel dílo cena díla"),
    ("darovací_smlouva", "darovací smlouva dárce obdarovaný darování bezplatně"),
    ("závazek", "závazek dlužník věřitel plnění splnění závazku"),
    ("porušení_smlouvy", "porušení smlouvy porušení povinnosti prodlení vadné plnění"),
    ("odstoupení", "odstoupení od smlouvy podstatné porušení zrušení ex tunc"),
    ("výpověď", "výpověď ukončení výpovědní doba výpovědní důvod"),
    ("manželství", "manželství manželé společné jmění manželů rozvod"),
    ("vyživovací_povinnost", "vyživovací povinnost výživné alimenty nezletilé dítě"),
    ("rodičovská_odpovědnost", "rodičovská odpovědnost péče o dítě výchova zastoupení"),
    ("dědictví", "dědictví dědic zůstavitel pozůstalost závěť intestátní"),
    ("závěť", "závěť testament zůstavitel dědic odkaz"),
    ("povinný_díl", "povinný díl nepominutelný dědic zákonný dědický podíl"),
    ("delikt", "delikt protiprávní čin zavinění škoda náhrada"),
    ("odpovědnost", "odpovědnost objektivní odpovědnost subjektivní zavinění"),
];

/// Query phrase for a doctrine, or the doctrine name itself
pub fn doctrine_phrase(doctrine: &str) -> &str {
    DOCTRINE_PHRASES
        .iter()
        .find(|(name, _)| *name == doctrine)
        .map(|(_, phrase)| *phrase)
        .unwrap_or(doctrine)
}

/// Builds unit query vectors through a cached embedder
pub struct TensionVectorizer<'a> {
    embedder: CachedEmbedder<'a>,
    add_scale: f32,
    subtract_scale: f32,
    tension_weight: f32,
    keyword_weight: f32,
}

impl<'a> TensionVectorizer<'a> {
    pub fn new(embedder: CachedEmbedder<'a>, config: &SearchConfig) -> Self {
        Self {
            embedder,
            add_scale: config.add_scale,
            subtract_scale: config.subtract_scale,
            tension_weight: config.tension_weight,
            keyword_weight: config.keyword_weight,
        }
    }

    /// `normalize(base + add_scale·Σadd − subtract_scale·Σsubtract)`
    pub async fn tension_vector(&self, strategy: &VectorStrategy) -> Result<Vec<f32>> {
        let base_text = strategy.base_terms.join(" ");
        let mut result = self.embedder.embed(&base_text).await?;

        for term in &strategy.add_modifiers {
            let v = self.embedder.embed(term).await?;
            result = add_scaled(&result, &v, self.add_scale)?;
        }

        for term in &strategy.subtract_modifiers {
            let v = self.embedder.embed(term).await?;
            result = add_scaled(&result, &v, -self.subtract_scale)?;
        }

        Ok(normalize(&result))
    }

    /// Strength-weighted average of the per-tension vectors.
    ///
    /// Tensions whose vectors cannot be built are left out; fails only when
    /// none can be built.
    pub async fn composite_vector(&self, strategies: &[VectorStrategy]) -> Result<Vec<f32>> {
        let results = join_all(strategies.iter().map(|s| async move {
            self.tension_vector(s).await.map(|v| (v, s.weight))
        }))
        .await;

        let mut vectors = Vec::with_capacity(results.len());
        let mut last_err = None;
        for (strategy, result) in strategies.iter().zip(results) {
            match result {
                Ok(weighted) => vectors.push(weighted),
                Err(e) => {
                    warn!("Dropping tension '{}': {}", strategy.tension_type, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if vectors.is_empty() => Err(e),
            _ => combine_weighted(&vectors),
        }
    }

    pub async fn doctrine_vector(&self, doctrine: &str, weight: f32) -> Result<WeightedVector> {
        let phrase = doctrine_phrase(doctrine);
        if phrase == doctrine {
            debug!("No query phrase for doctrine '{}', using its name", doctrine);
        }
        let vector = self.embedder.embed(phrase).await?;
        Ok(WeightedVector {
            vector: normalize(&vector),
            weight,
        })
    }

    /// Assemble the components of a hybrid search.
    ///
    /// Each component is built on its own and a failed one is dropped.
    /// Fails with [`Error::Search`] only when components were requested and
    /// none could be built.
    pub async fn build_hybrid_strategy(
        &self,
        strategies: &[VectorStrategy],
        doctrines: &[(String, f32)],
        keywords: Option<&str>,
    ) -> Result<HybridSearchStrategy> {
        let keywords = keywords.map(str::trim).filter(|k| !k.is_empty());
        let requested =
            usize::from(!strategies.is_empty()) + doctrines.len() + usize::from(keywords.is_some());
        let mut hybrid = HybridSearchStrategy::default();
        let mut last_err = None;

        if !strategies.is_empty() {
            match self.composite_vector(strategies).await {
                Ok(vector) => {
                    hybrid.tension = Some(WeightedVector {
                        vector,
                        weight: self.tension_weight,
                    })
                }
                Err(e) => {
                    warn!("Dropping tension component: {}", e);
                    last_err = Some(e);
                }
            }
        }

        let built = join_all(
            doctrines
                .iter()
                .map(|(name, weight)| self.doctrine_vector(name, *weight)),
        )
        .await;
        for ((name, _), result) in doctrines.iter().zip(built) {
            match result {
                Ok(component) => hybrid.doctrines.push(component),
                Err(e) => {
                    warn!("Dropping doctrine component '{}': {}", name, e);
                    last_err = Some(e);
                }
            }
        }

        if let Some(text) = keywords {
            match self.embedder.embed(text).await {
                Ok(vector) => {
                    hybrid.keyword = Some(WeightedVector {
                        vector: normalize(&vector),
                        weight: self.keyword_weight,
                    })
                }
                Err(e) => {
                    warn!("Dropping keyword component: {}", e);
                    last_err = Some(e);
                }
            }
        }

        if requested > 0 && hybrid.is_empty() {
            let cause = last_err.map(|e| e.to_string()).unwrap_or_default();
            return Err(Error::Search(format!(
                "no query component could be built: {}",
                cause
            )));
        }

        Ok(hybrid)
    }
}
