//! Cyclic nested queries: the deferred-load queue breaks blog → author →
//! latest-blog cycles through the first-level cache sentinel, and patches
//! land after the top-level query completes.

use tessera::testing::StubDriver;
use tessera::{SessionFactory, Value, ValueObject};
use tessera_core::meta::MetaValue;
use tessera_core::Configuration;
use tessera_sql::MapperDocumentBuilder;

fn object(pairs: &[(&str, Value)]) -> Value {
    let mut map = ValueObject::new();
    for (name, value) in pairs {
        map.insert(name.to_string(), value.clone());
    }
    Value::Object(map)
}

const BLOG_MAPPER: &str = r#"
<mapper namespace="app.BlogMapper">
  <resultMap id="blogResult" type="map">
    <id property="id" column="id"/>
    <result property="title" column="title"/>
    <association property="author" column="author_id" select="app.AuthorMapper.findById"/>
  </resultMap>
  <select id="findById" resultMap="blogResult">
    SELECT * FROM blog WHERE id = #{id}
  </select>
</mapper>
"#;

const AUTHOR_MAPPER: &str = r#"
<mapper namespace="app.AuthorMapper">
  <resultMap id="authorResult" type="map">
    <id property="id" column="id"/>
    <result property="name" column="name"/>
    <association property="latestBlog" column="latest_blog_id" select="app.BlogMapper.findById"/>
  </resultMap>
  <select id="findById" resultMap="authorResult">
    SELECT * FROM author WHERE id = #{id}
  </select>
</mapper>
"#;

fn cyclic_factory(driver: &StubDriver) -> SessionFactory {
    // blog 1 is written by author 9, whose latest blog is blog 1 again
    driver.on_query(
        "SELECT * FROM blog WHERE id = ?",
        &["id", "title", "author_id"],
        vec![vec![
            Value::Long(1),
            Value::String("post".into()),
            Value::Long(9),
        ]],
    );
    driver.on_query(
        "SELECT * FROM author WHERE id = ?",
        &["id", "name", "latest_blog_id"],
        vec![vec![
            Value::Long(9),
            Value::String("ann".into()),
            Value::Long(1),
        ]],
    );

    let mut config: Configuration = tessera_sql::configuration();
    config.set_environment(driver.environment("test"));
    MapperDocumentBuilder::new("blog-mapper.xml")
        .parse(&mut config, BLOG_MAPPER)
        .unwrap();
    MapperDocumentBuilder::new("author-mapper.xml")
        .parse(&mut config, AUTHOR_MAPPER)
        .unwrap();
    config.resolve_pending().unwrap();
    SessionFactory::new(config)
}

#[test]
fn cyclic_nested_queries_defer_and_complete() {
    let driver = StubDriver::new();
    let factory = cyclic_factory(&driver);
    let mut session = factory.open().unwrap();

    let blog = session
        .select_one("app.BlogMapper.findById", object(&[("id", Value::Long(1))]))
        .unwrap()
        .unwrap();

    // each statement ran exactly once despite the cycle
    assert_eq!(driver.executed().len(), 2);

    let meta = MetaValue::new(&blog);
    assert_eq!(meta.get("title").unwrap(), Value::String("post".into()));
    assert_eq!(meta.get("author.name").unwrap(), Value::String("ann".into()));

    // the deferred load filled author.latestBlog with the finished blog
    assert_eq!(
        meta.get("author.latestBlog.title").unwrap(),
        Value::String("post".into())
    );
    assert_eq!(meta.get("author.latestBlog.id").unwrap(), Value::Long(1));
}

#[test]
fn non_cyclic_nested_queries_resolve_eagerly() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM blog WHERE id = ?",
        &["id", "title", "author_id"],
        vec![vec![
            Value::Long(2),
            Value::String("other".into()),
            Value::Long(9),
        ]],
    );
    driver.on_query(
        "SELECT * FROM author WHERE id = ?",
        &["id", "name"],
        vec![vec![Value::Long(9), Value::String("ann".into())]],
    );

    let mut config: Configuration = tessera_sql::configuration();
    config.set_environment(driver.environment("test"));
    MapperDocumentBuilder::new("blog-mapper.xml")
        .parse(&mut config, BLOG_MAPPER)
        .unwrap();
    // author result has no further nesting here
    MapperDocumentBuilder::new("author-mapper.xml")
        .parse(
            &mut config,
            r#"<mapper namespace="app.AuthorMapper">
                 <select id="findById" resultType="map">
                   SELECT * FROM author WHERE id = #{id}
                 </select>
               </mapper>"#,
        )
        .unwrap();
    config.resolve_pending().unwrap();
    let factory = SessionFactory::new(config);

    let mut session = factory.open().unwrap();
    let blog = session
        .select_one("app.BlogMapper.findById", object(&[("id", Value::Long(2))]))
        .unwrap()
        .unwrap();

    assert_eq!(
        MetaValue::new(&blog).get("author.name").unwrap(),
        Value::String("ann".into())
    );
}
