use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    dao::{
        catalog::CatalogService,
        models::{
            BoardEntity, BoardWordEntity, CategoryEntity, ImageItemEntity, ScoreDeltaRequest,
            ScoreSetRequest, WordItemEntity,
        },
        scores::ScoreService,
        storage::StorageResult,
    },
    state::{
        content::{Board, BoardWord, Category, CategoryFilter, ImageItem, WordItem},
        team::{ScoreBoard, Team},
    },
};

use super::{
    config::HttpConfig,
    error::{HttpDaoError, HttpResult},
};

const IMAGE_ITEMS: &str = "api/imagem-oculta";
const WORD_ITEMS: &str = "api/conexao";
const BOARD_WORDS: &str = "api/bug/words";
const BOARDS: &str = "api/bug/boards";
const CATEGORIES: &str = "api/admin/categories";
const SCORES: &str = "api/scores";
const SCORES_UPDATE: &str = "api/scores/update";
const SCORES_SET: &str = "api/scores/set";
const SCORES_RESET: &str = "api/scores/reset";

/// Client for the catalog and score services, which share one base URL.
#[derive(Clone)]
pub struct HttpServices {
    client: Client,
    base_url: Arc<str>,
}

impl HttpServices {
    /// Build the client. No request is sent until the first call.
    pub fn connect(config: HttpConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|source| HttpDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client.request(method, url)
    }

    async fn get_json<T>(&self, path: &str, filter: Option<&CategoryFilter>) -> HttpResult<T>
    where
        T: DeserializeOwned,
    {
        let mut builder = self.request(Method::GET, path);
        if let Some(filter) = filter.filter(|filter| !filter.is_all()) {
            builder = builder.query(&[("categoryIds", filter.to_query())]);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| HttpDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HttpDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| HttpDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn post_json<B>(&self, path: &str, body: Option<&B>) -> HttpResult<()>
    where
        B: ?Sized + Serialize,
    {
        let mut builder = self.request(Method::POST, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| HttpDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HttpDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            })
        }
    }

    fn list<E, T>(
        &self,
        path: &'static str,
        filter: Option<CategoryFilter>,
    ) -> BoxFuture<'static, StorageResult<Vec<T>>>
    where
        E: DeserializeOwned + Into<T> + Send,
        T: Send + 'static,
    {
        let services = self.clone();
        Box::pin(async move {
            let entities = services.get_json::<Vec<E>>(path, filter.as_ref()).await?;
            Ok(entities.into_iter().map(Into::into).collect())
        })
    }
}

impl CatalogService for HttpServices {
    fn list_image_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ImageItem>>> {
        self.list::<ImageItemEntity, _>(IMAGE_ITEMS, Some(filter.clone()))
    }

    fn list_word_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<WordItem>>> {
        self.list::<WordItemEntity, _>(WORD_ITEMS, Some(filter.clone()))
    }

    fn list_board_words(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<BoardWord>>> {
        self.list::<BoardWordEntity, _>(BOARD_WORDS, Some(filter.clone()))
    }

    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<Board>>> {
        let services = self.clone();
        Box::pin(async move {
            let entities = services.get_json::<Vec<BoardEntity>>(BOARDS, None).await?;
            let boards = entities
                .into_iter()
                .filter_map(|entity| match Board::try_from(entity) {
                    Ok(board) => Some(board),
                    Err(err) => {
                        warn!(error = %err, "skipping board with unknown tile");
                        None
                    }
                })
                .collect();
            Ok(boards)
        })
    }

    fn list_categories(&self) -> BoxFuture<'static, StorageResult<Vec<Category>>> {
        self.list::<CategoryEntity, _>(CATEGORIES, None)
    }
}

impl ScoreService for HttpServices {
    fn get_scores(&self) -> BoxFuture<'static, StorageResult<ScoreBoard>> {
        let services = self.clone();
        Box::pin(async move { Ok(services.get_json::<ScoreBoard>(SCORES, None).await?) })
    }

    fn apply_delta(&self, team: Team, delta: i32) -> BoxFuture<'static, StorageResult<()>> {
        let services = self.clone();
        Box::pin(async move {
            let body = ScoreDeltaRequest {
                team,
                points_to_add: delta,
            };
            services
                .post_json(SCORES_UPDATE, Some(&body))
                .await
                .map_err(Into::into)
        })
    }

    fn set_absolute(&self, team: Team, points: i32) -> BoxFuture<'static, StorageResult<()>> {
        let services = self.clone();
        Box::pin(async move {
            let body = ScoreSetRequest { team, points };
            services
                .post_json(SCORES_SET, Some(&body))
                .await
                .map_err(Into::into)
        })
    }

    fn reset_all(&self) -> BoxFuture<'static, StorageResult<()>> {
        let services = self.clone();
        Box::pin(async move {
            services
                .post_json::<()>(SCORES_RESET, None)
                .await
                .map_err(Into::into)
        })
    }
}
