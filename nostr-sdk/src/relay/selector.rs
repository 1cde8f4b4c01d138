use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::endpoint::{dedup, RelayEndpoint};
use crate::config::{Config, DefaultRelays};
use crate::error::ConfigError;
use crate::event::kind::EventKind;

type SelectionKey = (u64, u64);

/// Resolves which relays an operation talks to.
///
/// Selections are cached for the lifetime of the selector; [`Self::add_relay`]
/// and [`Self::remove_relay`] clear the whole cache. Cloning shares it.
#[derive(Debug, Clone)]
pub struct RelaySelector {
  relays_file: PathBuf,
  defaults: DefaultRelays,
  cache: Arc<Mutex<HashMap<SelectionKey, Vec<RelayEndpoint>>>>,
}

fn preferred_hash(preferred: &[String]) -> u64 {
  let mut hasher = DefaultHasher::new();
  preferred.hash(&mut hasher);
  hasher.finish()
}

fn relay_lines(contents: &str) -> impl Iterator<Item = &str> {
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

impl RelaySelector {
  pub fn new<P: Into<PathBuf>>(relays_file: P, defaults: DefaultRelays) -> Self {
    Self {
      relays_file: relays_file.into(),
      defaults,
      cache: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.relays_file.clone(), config.default_relays.clone())
  }

  pub fn relays_file(&self) -> &Path {
    &self.relays_file
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<SelectionKey, Vec<RelayEndpoint>>> {
    self.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Relays to publish an event of `kind` to.
  ///
  /// `preferred` wins when non-empty and is returned as given. Otherwise the
  /// user relay list is used, or the single default relay of the kind when
  /// that list is empty or cannot be read.
  pub fn select_relays(
    &self,
    kind: EventKind,
    preferred: &[String],
  ) -> Result<Vec<RelayEndpoint>, ConfigError> {
    let key = (kind.as_u64(), preferred_hash(preferred));
    if let Some(cached) = self.lock().get(&key) {
      return Ok(cached.clone());
    }

    let selected = if !preferred.is_empty() {
      RelayEndpoint::parse_all(preferred)?
    } else {
      let default = self.default_relay(kind)?;
      match self.configured_relays() {
        Ok(relays) if !relays.is_empty() => relays,
        Ok(_) => {
          debug!("[RelaySelector] relay list is empty, using {default}");
          vec![default]
        }
        Err(ConfigError::RelayFile { path, source }) => {
          warn!("[RelaySelector] cannot read {path} ({source}), using {default}");
          vec![default]
        }
        Err(err) => return Err(err),
      }
    };

    self.lock().insert(key, selected.clone());
    Ok(selected)
  }

  /// Single hard-coded relay for `kind`.
  pub fn default_relay(&self, kind: EventKind) -> Result<RelayEndpoint, ConfigError> {
    RelayEndpoint::parse(self.defaults.single(kind))
  }

  /// Larger fan-out list for `kind`.
  pub fn default_relay_set(&self, kind: EventKind) -> Result<Vec<RelayEndpoint>, ConfigError> {
    RelayEndpoint::parse_all(self.defaults.set(kind))
  }

  /// Where to look for an event of unknown kind: the user list followed by
  /// both fan-out sets, without repetitions.
  pub fn search_relays(&self) -> Result<Vec<RelayEndpoint>, ConfigError> {
    let mut relays = match self.configured_relays() {
      Ok(relays) => relays,
      Err(ConfigError::RelayFile { path, source }) => {
        warn!("[RelaySelector] cannot read {path} ({source}), searching default relays only");
        Vec::new()
      }
      Err(err) => return Err(err),
    };
    relays.extend(RelayEndpoint::parse_all(&self.defaults.text_set)?);
    relays.extend(RelayEndpoint::parse_all(&self.defaults.document_set)?);
    Ok(dedup(relays))
  }

  fn read_file(&self) -> Result<String, ConfigError> {
    match fs::read_to_string(&self.relays_file) {
      Ok(contents) => Ok(contents),
      Err(err) if err.kind() == IoErrorKind::NotFound => Ok(String::new()),
      Err(source) => Err(ConfigError::RelayFile {
        path: self.relays_file.display().to_string(),
        source,
      }),
    }
  }

  fn write_file(&self, contents: &str) -> Result<(), ConfigError> {
    let to_config_error = |source| ConfigError::RelayFile {
      path: self.relays_file.display().to_string(),
      source,
    };
    if let Some(parent) = self.relays_file.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(to_config_error)?;
    }
    fs::write(&self.relays_file, contents).map_err(to_config_error)
  }

  /// Relays listed in the user relay file. A missing file is an empty list.
  pub fn configured_relays(&self) -> Result<Vec<RelayEndpoint>, ConfigError> {
    let contents = self.read_file()?;
    let relays = relay_lines(&contents)
      .map(RelayEndpoint::parse)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(dedup(relays))
  }

  /// Appends `url` to the relay file. Returns `false` if it was already there.
  pub fn add_relay(&self, url: &str) -> Result<bool, ConfigError> {
    let endpoint = RelayEndpoint::parse(url)?;
    let contents = self.read_file()?;

    let exists = relay_lines(&contents)
      .filter_map(|line| RelayEndpoint::parse(line).ok())
      .any(|listed| listed == endpoint);
    if exists {
      return Ok(false);
    }

    let mut lines: Vec<&str> = contents.lines().collect();
    lines.push(endpoint.as_str());
    self.write_file(&(lines.join("\n") + "\n"))?;
    self.invalidate();

    info!("[RelaySelector] added {endpoint} to {}", self.relays_file.display());
    Ok(true)
  }

  /// Removes every line naming `url`, keeping comments and other relays.
  /// Returns `false` if it was not listed.
  pub fn remove_relay(&self, url: &str) -> Result<bool, ConfigError> {
    let endpoint = RelayEndpoint::parse(url)?;
    let contents = self.read_file()?;

    let kept: Vec<&str> = contents
      .lines()
      .filter(|line| {
        let trimmed = line.trim();
        trimmed.is_empty()
          || trimmed.starts_with('#')
          || RelayEndpoint::parse(trimmed)
            .map(|listed| listed != endpoint)
            .unwrap_or(true)
      })
      .collect();

    if kept.len() == contents.lines().count() {
      return Ok(false);
    }

    let mut rewritten = kept.join("\n");
    if !rewritten.is_empty() {
      rewritten.push('\n');
    }
    self.write_file(&rewritten)?;
    self.invalidate();

    info!("[RelaySelector] removed {endpoint} from {}", self.relays_file.display());
    Ok(true)
  }

  pub fn invalidate(&self) {
    self.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::TempRelayFile;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn urls(endpoints: &[RelayEndpoint]) -> Vec<&str> {
    endpoints.iter().map(RelayEndpoint::as_str).collect()
  }

  fn make_sut(contents: Option<&str>) -> (RelaySelector, TempRelayFile) {
    let file = TempRelayFile::new(contents);
    let selector = RelaySelector::new(file.path(), DefaultRelays::default());
    (selector, file)
  }

  #[test]
  fn preferred_relays_are_returned_as_given() {
    let (selector, _file) = make_sut(Some("wss://listed.example.com\n"));
    let preferred = vec!["wss://b.example.com".to_string(), "wss://a.example.com".to_string()];

    let selected = selector.select_relays(EventKind::Text, &preferred).unwrap();

    assert_eq!(urls(&selected), vec!["wss://b.example.com", "wss://a.example.com"]);
  }

  #[test]
  fn invalid_preferred_relay_is_a_configuration_error() {
    let (selector, _file) = make_sut(None);
    let preferred = vec!["https://not-a-relay.example.com".to_string()];

    assert!(matches!(
      selector.select_relays(EventKind::Text, &preferred),
      Err(ConfigError::InvalidRelayUrl { .. })
    ));
  }

  #[test]
  fn reads_user_list_skipping_comments_and_blanks() {
    let (selector, _file) = make_sut(Some(
      "# my relays\n\nwss://one.example.com\n   \n  wss://two.example.com  \n#wss://off.example.com\n",
    ));

    let selected = selector.select_relays(EventKind::Wiki, &[]).unwrap();

    assert_eq!(urls(&selected), vec!["wss://one.example.com", "wss://two.example.com"]);
  }

  #[test]
  fn falls_back_to_kind_default_when_list_is_empty_or_missing() {
    let (selector, _file) = make_sut(Some("# nothing yet\n"));
    assert_eq!(
      urls(&selector.select_relays(EventKind::Text, &[]).unwrap()),
      vec!["wss://relay.damus.io"]
    );

    let (selector, _file) = make_sut(None);
    assert_eq!(
      urls(&selector.select_relays(EventKind::LongFormArticle, &[]).unwrap()),
      vec!["wss://thecitadel.nostr1.com"]
    );
  }

  #[test]
  fn invalid_line_in_list_is_a_configuration_error() {
    let (selector, _file) = make_sut(Some("wss://ok.example.com\nhttp://bad.example.com\n"));
    assert!(matches!(
      selector.select_relays(EventKind::Text, &[]),
      Err(ConfigError::InvalidRelayUrl { .. })
    ));
  }

  #[test]
  fn selection_is_deterministic_and_cached() {
    let (selector, file) = make_sut(Some("wss://one.example.com\nwss://two.example.com\n"));

    let first = selector.select_relays(EventKind::Text, &[]).unwrap();
    let second = selector.select_relays(EventKind::Text, &[]).unwrap();
    assert_eq!(first, second);

    // edits behind the selector's back are not seen until invalidated
    file.write("wss://three.example.com\n");
    assert_eq!(selector.select_relays(EventKind::Text, &[]).unwrap(), first);

    selector.invalidate();
    assert_eq!(
      urls(&selector.select_relays(EventKind::Text, &[]).unwrap()),
      vec!["wss://three.example.com"]
    );
  }

  #[test]
  fn add_and_remove_rewrite_file_and_invalidate() {
    let (selector, file) = make_sut(Some("# mine\nwss://one.example.com\n"));
    assert_eq!(selector.select_relays(EventKind::Text, &[]).unwrap().len(), 1);

    assert!(selector.add_relay("wss://two.example.com").unwrap());
    assert!(!selector.add_relay("wss://two.example.com/").unwrap());
    assert_eq!(
      urls(&selector.select_relays(EventKind::Text, &[]).unwrap()),
      vec!["wss://one.example.com", "wss://two.example.com"]
    );

    assert!(selector.remove_relay("wss://one.example.com").unwrap());
    assert!(!selector.remove_relay("wss://one.example.com").unwrap());
    assert_eq!(file.read(), "# mine\nwss://two.example.com\n");
    assert_eq!(
      urls(&selector.select_relays(EventKind::Text, &[]).unwrap()),
      vec!["wss://two.example.com"]
    );

    assert!(matches!(
      selector.add_relay("not a url"),
      Err(ConfigError::InvalidRelayUrl { .. })
    ));
  }

  #[test]
  fn add_creates_missing_file() {
    let (selector, file) = make_sut(None);
    assert!(selector.add_relay("wss://one.example.com").unwrap());
    assert_eq!(file.read(), "wss://one.example.com\n");
  }

  #[test]
  fn default_sets_and_search_set() {
    let (selector, _file) = make_sut(Some("wss://mine.example.com\nwss://relay.damus.io\n"));
    let defaults = DefaultRelays::default();

    assert_eq!(
      urls(&selector.default_relay_set(EventKind::Text).unwrap()),
      defaults.text_set.iter().map(String::as_str).collect::<Vec<_>>()
    );

    let search = selector.search_relays().unwrap();
    assert_eq!(search[0].as_str(), "wss://mine.example.com");
    assert_eq!(search[1].as_str(), "wss://relay.damus.io");
    assert_eq!(
      search.iter().filter(|r| r.as_str() == "wss://relay.damus.io").count(),
      1
    );
    for url in defaults.text_set.iter().chain(defaults.document_set.iter()) {
      assert!(search.iter().any(|r| r.as_str() == url));
    }
  }
}
